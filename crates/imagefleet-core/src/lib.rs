//! imagefleet core
//!
//! Image descriptors, manifest data, tag templates and the dependency graph
//! the orchestrator schedules from.

pub mod error;
pub mod graph;
pub mod manifest;
pub mod model;
pub mod template;

pub use error::{CoreError, GraphError, Result};
pub use graph::DependencyGraph;
pub use manifest::{ExtraArgSpec, ImageSpec, Manifest, Settings, TagSpec};
pub use model::{BuildContext, ImageDescriptor, ImageDescriptorBuilder, TagFailurePolicy, TagRule};
pub use template::TemplateArgs;
