// Service constants plus defaults that can be overridden from the environment.

use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PORT: u16 = 9900;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are Efficiency AI, an expert planner. Your goal is to take a user's objective and break it down into a highly specific, actionable, and efficient schedule and plan. Format the output with clear headers, bullet points, and timelines.";

pub const MISSING_INPUT_MESSAGE: &str = "Please provide both a goal and your OpenAI API key.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate plan";
pub const MALFORMED_RESPONSE_MESSAGE: &str =
    "The planning service returned a response without a plan.";

/// Builds the user turn that carries the objective.
pub fn objective_prompt(objective: &str) -> String {
    format!("Create a detailed plan and schedule for this goal: {}", objective)
}

// Use lazy_static to initialize static variables safely.
lazy_static::lazy_static! {
    pub static ref API_URL: String = env::var("EFFICIENCY_AI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    pub static ref PLANNER_MODEL: String = env::var("EFFICIENCY_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    pub static ref REQUEST_TIMEOUT: Duration = Duration::from_secs(
        env::var("EFFICIENCY_AI_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    );
}
