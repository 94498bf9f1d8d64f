pub mod requirement_store;

pub use requirement_store::RequirementStore;
