//! The decision seam: a backend-agnostic trait plus the retry/fallback
//! wrapper the control loop actually talks to.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::client::{ProviderClient, ProviderError};
use super::request::{DecisionRequest, DecisionResponse};
use crate::command::extract_button_from_text;
use crate::config::ProviderConfig;

/// Anything that can turn (screenshot + state + memory) into a command
/// plus a notepad update. Selected once at session start.
pub trait DecisionEngine {
    fn decide(
        &self,
        request: &DecisionRequest,
    ) -> impl Future<Output = Result<DecisionResponse, ProviderError>> + Send;
}

impl DecisionEngine for ProviderClient {
    /// One backend round trip. A reply without a recognizable command is
    /// answered with the fallback response, never an error: a single
    /// malformed model reply must not stall the control loop.
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionResponse, ProviderError> {
        let raw = self.request_once(request).await?;

        let button = raw
            .button
            .or_else(|| extract_button_from_text(&raw.text));

        let Some(button) = button else {
            tracing::warn!(provider = %self.kind(), "no press_button call in reply, using fallback");
            return Ok(DecisionResponse::fallback(request));
        };

        Ok(DecisionResponse {
            button,
            notepad: raw.notepad.unwrap_or_else(|| request.notepad.clone()),
            thinking: raw.text,
            is_fallback: false,
        })
    }
}

/// Bounded-retry wrapper around any engine.
///
/// Transient failures are retried with exponential backoff up to the
/// attempt ceiling, after which the fallback response is returned. Fatal
/// failures are surfaced immediately.
pub struct DecisionAdapter<E> {
    engine: E,
    /// Total attempt ceiling (not additional retries).
    max_attempts: u32,
    backoff_base: Duration,
    call_timeout: Duration,
}

impl<E: DecisionEngine> DecisionAdapter<E> {
    pub fn new(engine: E, max_attempts: u32, backoff_base: Duration, call_timeout: Duration) -> Self {
        Self {
            engine,
            max_attempts: max_attempts.max(1),
            backoff_base,
            call_timeout,
        }
    }

    /// Build from a provider config, taking ceiling/backoff/timeout from it.
    pub fn from_config(engine: E, config: &ProviderConfig) -> Self {
        Self::new(
            engine,
            config.max_retries,
            Duration::from_secs(config.retry_backoff_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Delay before the retry following `attempt` (1-based): doubles each
    /// time from the configured base.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    pub async fn decide(
        &self,
        request: &DecisionRequest,
    ) -> Result<DecisionResponse, ProviderError> {
        for attempt in 1..=self.max_attempts {
            let outcome = match timeout(self.call_timeout, self.engine.decide(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transient(format!(
                    "backend call exceeded {:?}",
                    self.call_timeout
                ))),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(ProviderError::Fatal(reason)) => {
                    tracing::error!(reason, "fatal provider failure");
                    return Err(ProviderError::Fatal(reason));
                }
                Err(ProviderError::Transient(reason)) => {
                    if attempt < self.max_attempts {
                        let delay = self.backoff_delay(attempt);
                        tracing::warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            reason,
                            ?delay,
                            "transient provider failure, retrying"
                        );
                        sleep(delay).await;
                    } else {
                        tracing::warn!(
                            attempts = self.max_attempts,
                            reason,
                            "retry ceiling reached, using fallback command"
                        );
                    }
                }
            }
        }

        Ok(DecisionResponse::fallback(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Button, FALLBACK_BUTTON};
    use crate::state::{Direction, GameStateSnapshot, Screenshot};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> DecisionRequest {
        DecisionRequest {
            snapshot: GameStateSnapshot {
                direction: Direction::Up,
                x: 1,
                y: 1,
                map_id: 0,
                textbox_active: false,
                screenshot_path: "/tmp/s.png".to_string(),
            },
            screenshot: Screenshot {
                base64_data: String::new(),
                width: 160,
                height: 144,
            },
            context: String::new(),
            notepad: "prior notes".to_string(),
        }
    }

    struct ScriptedEngine {
        attempts: AtomicU32,
        fail_first: u32,
        error: ProviderError,
    }

    impl DecisionEngine for ScriptedEngine {
        async fn decide(
            &self,
            request: &DecisionRequest,
        ) -> Result<DecisionResponse, ProviderError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(self.error.clone());
            }
            Ok(DecisionResponse {
                button: Button::Up,
                notepad: request.notepad.clone(),
                thinking: String::new(),
                is_fallback: false,
            })
        }
    }

    fn adapter(engine: ScriptedEngine, max_attempts: u32) -> DecisionAdapter<ScriptedEngine> {
        DecisionAdapter::new(
            engine,
            max_attempts,
            Duration::ZERO,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let engine = ScriptedEngine {
            attempts: AtomicU32::new(0),
            fail_first: 2,
            error: ProviderError::Transient("timeout".to_string()),
        };
        let adapter = adapter(engine, 3);

        let response = adapter.decide(&request()).await.unwrap();
        assert_eq!(response.button, Button::Up);
        assert_eq!(adapter.engine.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_ceiling_yields_fallback_without_extra_attempt() {
        let engine = ScriptedEngine {
            attempts: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: ProviderError::Transient("timeout".to_string()),
        };
        let adapter = adapter(engine, 3);

        let response = adapter.decide(&request()).await.unwrap();
        assert!(response.is_fallback);
        assert_eq!(response.button, FALLBACK_BUTTON);
        assert_eq!(response.notepad, "prior notes");
        // Exactly the ceiling, never a fourth attempt.
        assert_eq!(adapter.engine.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_surfaces_immediately() {
        let engine = ScriptedEngine {
            attempts: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: ProviderError::Fatal("bad credentials".to_string()),
        };
        let adapter = adapter(engine, 3);

        let err = adapter.decide(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
        assert_eq!(adapter.engine.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let engine = ScriptedEngine {
            attempts: AtomicU32::new(0),
            fail_first: 0,
            error: ProviderError::Transient(String::new()),
        };
        let adapter = DecisionAdapter::new(
            engine,
            3,
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        assert_eq!(adapter.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(adapter.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(adapter.backoff_delay(3), Duration::from_secs(8));
    }
}
