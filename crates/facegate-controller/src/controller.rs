//! The lock controller task.
//!
//! One task owns the [`LockStateMachine`], the dwell timer and the right to
//! command the actuator. Callers hold a cloneable [`LockController`] handle
//! and submit triggers over a bounded queue; each trigger is evaluated,
//! sent to the actuator and committed before the next one is looked at, so
//! transitions never overlap. A full queue rejects the request as
//! [`ControllerError::Busy`] instead of waiting.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use facegate_core::LockState;
use facegate_core::constants::{DEFAULT_CONTROLLER_QUEUE_CAPACITY, DEFAULT_DWELL_MS};
use facegate_hardware::{ActuatorLink, SerialTransport};
use facegate_storage::AuditLog;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, Result};
use crate::state_machine::{LockStateMachine, LockTransition, LockTrigger};

/// What to do when the actuator does not take an unlock command.
///
/// Lock commands (CLOSE) always update the logical state: a lock that may
/// still be open is reported closed rather than left open indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteFailurePolicy {
    /// Flip to OPEN anyway and run the dwell timer.
    #[default]
    Optimistic,

    /// Stay CLOSED and report [`ControllerError::CommandFailed`].
    Revert,
}

/// Lock controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// How long the lock stays open after an unlock.
    pub dwell: Duration,

    /// Handling of undelivered unlock commands.
    pub write_failure_policy: WriteFailurePolicy,

    /// Requests that may wait for the controller before it reports busy.
    pub queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            write_failure_policy: WriteFailurePolicy::default(),
            queue_capacity: DEFAULT_CONTROLLER_QUEUE_CAPACITY,
        }
    }
}

enum Request {
    Trigger {
        trigger: LockTrigger,
        reply: oneshot::Sender<Result<LockTransition>>,
    },
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<LockTransition>>,
    },
}

/// Handle to the lock controller task.
///
/// Cheap to clone; all clones talk to the same task.
#[derive(Clone)]
pub struct LockController {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<LockState>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for LockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockController")
            .field("state", &self.state())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl LockController {
    /// Start the controller task in the CLOSED state.
    ///
    /// The task runs until [`shutdown`](Self::shutdown) is called or every
    /// handle is dropped. On the way out it calls
    /// [`ActuatorLink::shutdown`], which sends the final CLOSE.
    pub fn spawn<T, A>(
        actuator: Arc<ActuatorLink<T>>,
        audit: A,
        config: ControllerConfig,
    ) -> (Self, JoinHandle<()>)
    where
        T: SerialTransport,
        A: AuditLog,
    {
        let (requests_tx, requests_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(LockState::Closed);
        let cancel = CancellationToken::new();

        let actor = ControllerTask {
            machine: LockStateMachine::new(),
            actuator,
            audit: Arc::new(audit),
            config,
            requests: requests_rx,
            state: state_tx,
            dwell: None,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(actor.run());

        let handle = Self {
            requests: requests_tx,
            state: state_rx,
            cancel,
        };
        (handle, task)
    }

    /// Unlock for a confirmed identity.
    ///
    /// # Errors
    ///
    /// [`ControllerError::AlreadyOpen`] when the lock is open, plus the
    /// queue errors described on [`LockController`].
    pub async fn confirm(&self, name: impl Into<String>) -> Result<LockTransition> {
        self.submit(LockTrigger::Confirmed(name.into())).await
    }

    /// Operator unlock. Same effect as a confirmation, without an audit entry.
    pub async fn manual_open(&self) -> Result<LockTransition> {
        self.submit(LockTrigger::ManualOpen).await
    }

    /// Operator lock. Cancels a pending dwell timer.
    pub async fn manual_close(&self) -> Result<LockTransition> {
        self.submit(LockTrigger::ManualClose).await
    }

    /// Lock because nobody is in view. Cancels a pending dwell timer.
    pub async fn absence_timeout(&self) -> Result<LockTransition> {
        self.submit(LockTrigger::AbsenceTimeout).await
    }

    async fn submit(&self, trigger: LockTrigger) -> Result<LockTransition> {
        let (reply, response) = oneshot::channel();
        self.enqueue(Request::Trigger { trigger, reply })?;
        response.await.map_err(|_| ControllerError::ShutDown)?
    }

    fn enqueue(&self, request: Request) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ControllerError::ShutDown);
        }
        self.requests.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ControllerError::Busy,
            mpsc::error::TrySendError::Closed(_) => ControllerError::ShutDown,
        })
    }

    /// Current lock state. Never blocks.
    pub fn state(&self) -> LockState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state.clone()
    }

    /// The last `limit` applied transitions, oldest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<LockTransition>> {
        let (reply, response) = oneshot::channel();
        self.enqueue(Request::History { limit, reply })?;
        response.await.map_err(|_| ControllerError::ShutDown)
    }

    /// Whether shutdown has been requested.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the controller and wait until the actuator has been shut down.
    ///
    /// Pending dwell timers are dropped without firing. Requests still in
    /// the queue fail with [`ControllerError::ShutDown`].
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.requests.closed().await;
    }
}

struct ControllerTask<T: SerialTransport, A: AuditLog> {
    machine: LockStateMachine,
    actuator: Arc<ActuatorLink<T>>,
    audit: Arc<A>,
    config: ControllerConfig,
    requests: mpsc::Receiver<Request>,
    state: watch::Sender<LockState>,
    dwell: Option<Pin<Box<Sleep>>>,
    cancel: CancellationToken,
}

impl<T: SerialTransport, A: AuditLog> ControllerTask<T, A> {
    async fn run(mut self) {
        info!(
            dwell_ms = self.config.dwell.as_millis() as u64,
            policy = ?self.config.write_failure_policy,
            "Lock controller started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = dwell_elapsed(&mut self.dwell) => {
                    self.dwell = None;
                    if let Err(e) = self.apply(LockTrigger::DwellExpired).await {
                        debug!(error = %e, "Dwell expiry ignored");
                    }
                }

                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        if self.dwell.take().is_some() {
            debug!("Pending dwell timer cancelled");
        }
        self.actuator.shutdown().await;
        info!(state = %self.machine.state(), "Lock controller stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Trigger { trigger, reply } => {
                let result = self.apply(trigger).await;
                // The caller may have given up waiting; the transition stands.
                let _ = reply.send(result);
            }
            Request::History { limit, reply } => {
                let _ = reply.send(self.machine.last_transitions(limit));
            }
        }
    }

    async fn apply(&mut self, trigger: LockTrigger) -> Result<LockTransition> {
        let target = match self.machine.evaluate(&trigger) {
            Ok(target) => target,
            Err(e) => {
                debug!(trigger = %trigger, state = %self.machine.state(), "Transition rejected");
                return Err(e);
            }
        };

        let command = target.command();
        let delivered = self.actuator.send(command).await.is_ok();

        if !delivered
            && target.is_open()
            && self.config.write_failure_policy == WriteFailurePolicy::Revert
        {
            warn!(trigger = %trigger, "Unlock not delivered, staying closed");
            return Err(ControllerError::CommandFailed { command });
        }

        let transition = self.machine.commit(trigger, delivered);
        self.state.send_replace(transition.to);

        self.dwell = match transition.to {
            LockState::Open => Some(Box::pin(tokio::time::sleep(self.config.dwell))),
            LockState::Closed => None,
        };

        if let Some(name) = transition.trigger.identity() {
            self.record_unlock(name.to_string(), transition.at);
        }

        info!(
            from = %transition.from,
            to = %transition.to,
            trigger = %transition.trigger,
            delivered,
            "Lock transition"
        );
        Ok(transition)
    }

    fn record_unlock(&self, name: String, opened_at: DateTime<Utc>) {
        let audit = Arc::clone(&self.audit);
        tokio::spawn(async move {
            if let Err(e) = audit.record(&name, opened_at).await {
                warn!(name = %name, error = %e, "Failed to write audit entry");
            }
        });
    }
}

async fn dwell_elapsed(dwell: &mut Option<Pin<Box<Sleep>>>) {
    match dwell {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
