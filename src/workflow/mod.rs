pub mod generation_worker;
pub mod requirement_ctx;
pub mod review_worker;

pub use generation_worker::GenerationWorker;
pub use requirement_ctx::RequirementCtx;
pub use review_worker::ReviewWorker;
