//! Pipeline building and execution.
//!
//! This module provides:
//! - The strategy seam and the chain runner
//! - Pipeline builder with validation
//! - Typed and untyped pipeline execution
//! - A keyed registry of shared pipelines

mod builder;
mod component;
mod executor;
mod registry;

pub use builder::ResiliencePipelineBuilder;
pub use component::{Next, ResilienceStrategy};
pub use executor::{AnyResult, ResiliencePipeline};
pub use registry::{BuilderFactory, ResiliencePipelineRegistry};
