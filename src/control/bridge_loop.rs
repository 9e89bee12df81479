//! The turn-cycle state machine orchestrating transport, memory, and the
//! decision engine.
//!
//! One logical session, one active turn: at most one screenshot request
//! and one decision call are outstanding at any time, so turn state needs
//! no locking. The only externally unbounded suspension is the backend
//! call, which the decision adapter bounds with its own timeout. A stop
//! signal is observed at every suspension point.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;

use super::rate_limit::RateLimiter;
use crate::memory::{MemoryStore, ShortTermEntry};
use crate::provider::{DecisionAdapter, DecisionEngine, DecisionRequest};
use crate::state::{load_screenshot, GameStateSnapshot};
use crate::transport::{
    BridgeListener, EmulatorSession, ProtocolError, Received, TransportError, WireMessage,
};

/// Protocol states of the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitConnect,
    AwaitReady,
    RequestScreenshot,
    AwaitScreenshot,
    Decide,
    SendCommand,
    Terminated,
}

/// Session-fatal failures that unwind to teardown.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("fatal provider failure: {0}")]
    Provider(String),
    #[error("emulator connection lost after {0} reconnect attempts")]
    ConnectionLost(u32),
}

/// Why one accepted session ended.
enum SessionEnd {
    Stopped,
    ConnectionLost,
    Fatal(BridgeError),
}

/// The control loop. Owns the session, memory store, and rate limiter
/// exclusively; constructed once per run with an explicit lifecycle.
pub struct ControlLoop<E> {
    listener: BridgeListener,
    engine: DecisionAdapter<E>,
    memory: MemoryStore,
    rate_limiter: RateLimiter,
    max_reconnects: u32,
    state: LoopState,
    turn: u64,
}

impl<E: DecisionEngine> ControlLoop<E> {
    pub fn new(
        listener: BridgeListener,
        engine: DecisionAdapter<E>,
        memory: MemoryStore,
        cooldown: Duration,
        max_reconnects: u32,
    ) -> Self {
        Self {
            listener,
            engine,
            memory,
            rate_limiter: RateLimiter::new(cooldown),
            max_reconnects,
            state: LoopState::AwaitConnect,
            turn: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Run until stopped, the connection is lost beyond the reconnect
    /// budget, or a fatal provider failure occurs. Teardown always
    /// flushes the last known-good notepad before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), BridgeError> {
        let mut reconnects_used = 0u32;

        let result = loop {
            self.state = LoopState::AwaitConnect;
            tracing::info!("waiting for emulator connection");

            let session = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(session) => session,
                    Err(err) => break Err(err.into()),
                },
            };

            match self.drive_session(session, &mut shutdown).await {
                SessionEnd::Stopped => break Ok(()),
                SessionEnd::Fatal(err) => break Err(err),
                SessionEnd::ConnectionLost => {
                    if reconnects_used >= self.max_reconnects {
                        break Err(BridgeError::ConnectionLost(reconnects_used));
                    }
                    reconnects_used += 1;
                    tracing::warn!(
                        attempt = reconnects_used,
                        budget = self.max_reconnects,
                        "emulator disconnected, waiting for reconnect"
                    );
                }
            }
        };

        self.state = LoopState::Terminated;
        if let Err(err) = self.memory.persist_notepad() {
            tracing::warn!(%err, "failed to flush notepad during teardown");
        }
        tracing::info!(turns = self.turn, "control loop terminated");
        result
    }

    /// Drive one accepted session through turn cycles until it ends.
    async fn drive_session(
        &mut self,
        mut session: EmulatorSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        self.state = LoopState::AwaitReady;

        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => return SessionEnd::Stopped,
                received = session.receive() => match received {
                    Ok(received) => received,
                    Err(err) => {
                        tracing::error!(%err, "transport read failed");
                        return SessionEnd::ConnectionLost;
                    }
                },
            };

            match received {
                Received::Disconnected => {
                    tracing::info!("emulator closed the connection");
                    return SessionEnd::ConnectionLost;
                }
                Received::Malformed(err) => {
                    // Recoverable: skip the turn, wait for the next ready.
                    self.skip_turn(&mut session, &err);
                }
                Received::Message(WireMessage::Ready) => {
                    session.ready = true;
                    if let Some(end) = self.on_ready(&mut session, shutdown).await {
                        return end;
                    }
                }
                Received::Message(msg @ WireMessage::ScreenshotWithState { .. }) => {
                    if !session.awaiting_screenshot {
                        tracing::warn!("unsolicited screenshot_with_state, ignoring");
                        continue;
                    }
                    session.awaiting_screenshot = false;
                    if let Some(end) = self.on_screenshot(&mut session, &msg, shutdown).await {
                        return end;
                    }
                }
            }
        }
    }

    /// `AWAIT_READY -> REQUEST_SCREENSHOT`, gated on the emulator's
    /// readiness, the outstanding-request flag, and the decision cooldown.
    async fn on_ready(
        &mut self,
        session: &mut EmulatorSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<SessionEnd> {
        // At most one screenshot request is outstanding: a duplicate or
        // spurious ready line must not stack a second request.
        if !session.ready || session.awaiting_screenshot {
            tracing::debug!(
                ready = session.ready,
                outstanding = session.awaiting_screenshot,
                "ignoring ready, not in a requestable state"
            );
            return None;
        }

        let wait = self.rate_limiter.remaining();
        if !wait.is_zero() {
            tracing::debug!(?wait, "cooldown pending before next request");
            tokio::select! {
                _ = shutdown.changed() => return Some(SessionEnd::Stopped),
                _ = sleep(wait) => {}
            }
        }

        self.state = LoopState::RequestScreenshot;
        if let Err(err) = session.request_screenshot().await {
            tracing::error!(%err, "failed to request screenshot");
            return Some(SessionEnd::ConnectionLost);
        }
        self.state = LoopState::AwaitScreenshot;
        None
    }

    /// `AWAIT_SCREENSHOT -> DECIDE -> SEND_COMMAND -> AWAIT_READY`.
    async fn on_screenshot(
        &mut self,
        session: &mut EmulatorSession,
        msg: &WireMessage,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<SessionEnd> {
        let snapshot = match GameStateSnapshot::decode(msg) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.skip_turn(session, &err);
                return None;
            }
        };

        let screenshot = match load_screenshot(&snapshot.screenshot_path) {
            Ok(screenshot) => screenshot,
            Err(err) => {
                self.skip_turn(session, &err);
                return None;
            }
        };

        tracing::info!(turn = self.turn, state = %snapshot.summary(), "requesting decision");
        self.state = LoopState::Decide;

        let request = DecisionRequest {
            context: self.memory.render_context(),
            notepad: self.memory.notepad().to_string(),
            snapshot,
            screenshot,
        };

        let response = tokio::select! {
            _ = shutdown.changed() => return Some(SessionEnd::Stopped),
            decided = self.engine.decide(&request) => match decided {
                Ok(response) => response,
                Err(err) => return Some(SessionEnd::Fatal(BridgeError::Provider(err.to_string()))),
            },
        };

        if !response.thinking.is_empty() {
            tracing::debug!(thinking = %response.thinking, "model reasoning");
        }

        // Memory reflects the decision before the command is in flight.
        self.memory.append_short_term(ShortTermEntry::new(
            self.turn,
            request.snapshot.summary(),
            response.button,
        ));
        if let Err(err) = self.memory.replace_notepad(response.notepad) {
            // Non-fatal: continue with the in-memory text.
            tracing::warn!(%err, "notepad persistence failed, continuing unpersisted");
        }

        self.state = LoopState::SendCommand;
        tracing::info!(
            turn = self.turn,
            button = %response.button,
            code = response.button.code(),
            fallback = response.is_fallback,
            "sending command"
        );
        if let Err(err) = session.send_button(response.button).await {
            tracing::error!(%err, "failed to send command");
            return Some(SessionEnd::ConnectionLost);
        }

        self.rate_limiter.record_decision();
        self.turn += 1;
        self.state = LoopState::AwaitReady;
        None
    }

    /// Absorb a recoverable per-message failure: log it, return to
    /// `AWAIT_READY` without invoking the decision engine.
    ///
    /// The cooldown is restarted even though no command was sent, so the
    /// next `ready` cannot trigger a screenshot request sooner than a
    /// completed turn would have.
    fn skip_turn(&mut self, session: &mut EmulatorSession, err: &ProtocolError) {
        tracing::warn!(%err, turn = self.turn, "malformed message, skipping turn");
        session.awaiting_screenshot = false;
        self.rate_limiter.record_decision();
        self.state = LoopState::AwaitReady;
    }
}
