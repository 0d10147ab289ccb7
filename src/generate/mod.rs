//! Notebook plan generation against a hosted language model.

pub mod client;
pub mod discovery;
pub mod models;
pub mod orchestrator;
pub mod parse;
pub mod plan;
pub mod prompts;

pub use client::{GeminiClient, GenerationError, GenerationErrorKind};
pub use orchestrator::{
    handle_generate, GenerateRequest, GenerateResponse, ModelBackend, PlanError, PlanGenerator,
};
pub use parse::{parse_plan, ParseError};
pub use plan::{GenerateMode, Plan};
