pub mod document_loader;

pub use document_loader::{load_requirements_from_document, segment_requirements};
