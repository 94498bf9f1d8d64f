pub mod artifact_writer;
pub mod llm_service;

pub use artifact_writer::ArtifactWriter;
pub use llm_service::{ChatModel, LlmService};
