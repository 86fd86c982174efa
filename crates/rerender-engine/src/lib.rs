pub mod aspect;
pub mod config;
pub mod controller;
pub mod dryrun;
pub mod gemini;
pub mod intake;
pub mod prompt;
pub mod service;
pub mod state;

pub use config::{build_service, ResolvedModels, ServiceConfig};
pub use controller::{EditOutcome, PipelineController};
pub use dryrun::DryrunService;
pub use gemini::GeminiService;
pub use service::{EditRequest, GenerateRequest, ServiceReply, StyleService};
pub use state::PipelineState;
