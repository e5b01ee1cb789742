//! The action controller: owns one session's interaction state and runs the
//! "generate a plan" action against the completion service.
//!
//! Every state change goes through [`InteractionState::apply`] while the state
//! lock is held, and the resulting snapshot is broadcast before the lock is
//! released, so observers see transitions in commit order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::app_state::{Credential, InteractionState, StateEvent, StateView};
use crate::clipboard::ClipboardSink;
use crate::error::GenerationError;
use crate::llm_interaction::CompletionService;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

struct Inner {
    state: InteractionState,
    in_flight: Option<CancellationToken>,
}

pub struct ActionController {
    service: Arc<dyn CompletionService>,
    clipboard: Arc<dyn ClipboardSink>,
    inner: Mutex<Inner>,
    updates: broadcast::Sender<StateView>,
}

impl ActionController {
    pub fn new(service: Arc<dyn CompletionService>, clipboard: Arc<dyn ClipboardSink>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            service,
            clipboard,
            inner: Mutex::new(Inner {
                state: InteractionState::new(),
                in_flight: None,
            }),
            updates,
        }
    }

    /// Receives a snapshot after every committed transition.
    pub fn subscribe(&self) -> broadcast::Receiver<StateView> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> StateView {
        self.lock().state.view()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().state.is_busy
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, inner: &mut Inner, event: StateEvent) -> StateView {
        let current = std::mem::take(&mut inner.state);
        inner.state = current.apply(event);
        let view = inner.state.view();
        // No subscribers is fine.
        let _ = self.updates.send(view.clone());
        view
    }

    pub fn update_goal(&self, text: impl Into<String>) -> StateView {
        let mut inner = self.lock();
        self.commit(&mut inner, StateEvent::GoalChanged(text.into()))
    }

    pub fn update_credential(&self, credential: impl Into<Credential>) -> StateView {
        let mut inner = self.lock();
        self.commit(&mut inner, StateEvent::CredentialChanged(credential.into()))
    }

    /// Runs one generation. Calls made while a request is in flight are
    /// rejected with [`GenerationError::Busy`] and leave the state untouched.
    #[instrument(skip(self))]
    pub async fn generate(&self) -> Result<String, GenerationError> {
        let (request, credential, token) = {
            let mut inner = self.lock();
            if inner.state.is_busy {
                debug!("Ignoring generate while a request is in flight");
                return Err(GenerationError::Busy);
            }

            match inner.state.validate() {
                Err(e) => {
                    info!("Generate rejected: missing goal or credential");
                    self.commit(&mut inner, StateEvent::ValidationFailed(e.to_string()));
                    return Err(e);
                }
                Ok(request) => {
                    let token = CancellationToken::new();
                    inner.in_flight = Some(token.clone());
                    let credential = inner.state.credential.clone();
                    self.commit(&mut inner, StateEvent::RequestStarted);
                    (request, credential, token)
                }
            }
        };

        let mut guard = InFlight {
            controller: self,
            terminal: None,
        };

        let timeout = self.service.timeout();
        info!(objective_len = request.objective.len(), ?timeout, "Requesting plan");

        let outcome = tokio::select! {
            _ = token.cancelled() => Err(GenerationError::Cancelled),
            result = tokio::time::timeout(timeout, self.service.generate_plan(&request, &credential)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::transport(format!(
                        "Request timed out after {:?}",
                        timeout
                    ))),
                }
            }
        };

        match &outcome {
            Ok(plan) => {
                info!(plan_len = plan.len(), "Plan generated");
                guard.terminal = Some(StateEvent::Succeeded(plan.clone()));
            }
            Err(e) => {
                warn!(kind = ?e.kind(), "Plan generation failed");
                guard.terminal = Some(StateEvent::Failed(e.to_string()));
            }
        }
        drop(guard);

        outcome
    }

    /// Aborts the in-flight request, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.lock().in_flight.as_ref() {
            Some(token) => {
                info!("Cancelling in-flight plan request");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Copies the current plan to the clipboard. Does nothing without a plan;
    /// clipboard failures are logged, never surfaced.
    pub fn copy_result(&self) -> bool {
        let plan = self.lock().state.plan.clone();
        let Some(plan) = plan else {
            debug!("No plan to copy");
            return false;
        };

        match self.clipboard.set_text(&plan) {
            Ok(()) => {
                info!(plan_len = plan.len(), "Plan copied to clipboard");
                true
            }
            Err(e) => {
                warn!("Failed to copy plan to clipboard: {}", e);
                false
            }
        }
    }
}

/// Commits the terminal transition when dropped, so the busy flag clears on
/// every exit path, including the `generate` future being dropped mid-flight.
struct InFlight<'a> {
    controller: &'a ActionController,
    terminal: Option<StateEvent>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let event = self
            .terminal
            .take()
            .unwrap_or_else(|| StateEvent::Failed(GenerationError::Cancelled.to_string()));
        let mut inner = self.controller.lock();
        inner.in_flight = None;
        self.controller.commit(&mut inner, event);
    }
}
