use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GenerationError;
use crate::llm_interaction::PlanRequest;

/// Caller-supplied API key. Only `expose` hands out the raw value, and the
/// `Debug` impl is redacted so it can sit inside traced structs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Requesting,
    // Idle again, holding the outcome of the last invocation
    Succeeded,
    Failed,
}

/// Per-session interaction state. Created empty, mutated only through `apply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionState {
    pub goal: String,
    pub credential: Credential,
    pub plan: Option<String>,
    pub is_busy: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    GoalChanged(String),
    CredentialChanged(Credential),
    ValidationFailed(String),
    RequestStarted,
    Succeeded(String),
    Failed(String),
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure transition function: consumes the current state and returns the next one.
    pub fn apply(self, event: StateEvent) -> Self {
        match event {
            StateEvent::GoalChanged(goal) => Self { goal, ..self },
            StateEvent::CredentialChanged(credential) => Self { credential, ..self },
            StateEvent::ValidationFailed(message) => Self {
                plan: None,
                error: Some(message),
                is_busy: false,
                ..self
            },
            StateEvent::RequestStarted => Self {
                plan: None,
                error: None,
                is_busy: true,
                ..self
            },
            StateEvent::Succeeded(plan) => Self {
                plan: Some(plan),
                error: None,
                is_busy: false,
                ..self
            },
            StateEvent::Failed(message) => Self {
                plan: None,
                error: Some(message),
                is_busy: false,
                ..self
            },
        }
    }

    /// Builds the outbound request, or fails if either input is empty.
    pub fn validate(&self) -> Result<PlanRequest, GenerationError> {
        if self.goal.is_empty() || self.credential.is_empty() {
            return Err(GenerationError::Validation);
        }
        Ok(PlanRequest::new(self.goal.clone()))
    }

    pub fn phase(&self) -> Phase {
        if self.is_busy {
            Phase::Requesting
        } else if self.plan.is_some() {
            Phase::Succeeded
        } else if self.error.is_some() {
            Phase::Failed
        } else {
            Phase::Idle
        }
    }

    pub fn view(&self) -> StateView {
        StateView {
            goal: self.goal.clone(),
            plan: self.plan.clone(),
            error: self.error.clone(),
            is_busy: self.is_busy,
            phase: self.phase(),
            has_credential: !self.credential.is_empty(),
        }
    }
}

/// Snapshot handed to observers. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    pub goal: String,
    pub plan: Option<String>,
    pub error: Option<String>,
    pub is_busy: bool,
    pub phase: Phase,
    pub has_credential: bool,
}
