pub mod app_state;
pub mod chat;
pub mod clipboard;
pub mod constants;
pub mod controller;
pub mod error;
pub mod llm_interaction;
pub mod web_server;

pub use app_state::{Credential, InteractionState, Phase, StateEvent, StateView};
pub use controller::ActionController;
pub use error::{ErrorKind, GenerationError};
pub use llm_interaction::{CompletionService, OpenAiPlanner, PlanRequest, PlannerConfig};
