pub mod loaders;
pub mod requirement;
pub mod verdict;

pub use loaders::{load_requirements_from_document, segment_requirements};
pub use requirement::{Requirement, RequirementDraft, RequirementStatus};
pub use verdict::{classify_verdict, ReviewVerdict, PASS_TOKEN};
