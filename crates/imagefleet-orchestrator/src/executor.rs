//! Executor trait
//!
//! Implemented by every build backend (Docker, dry-run, test doubles). The
//! orchestrator only ever talks to this trait.

use crate::error::PhaseError;
use async_trait::async_trait;
use imagefleet_core::ImageDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Handle to a locally built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltImage {
    pub id: String,
}

impl BuiltImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Built images of an image's direct dependencies, keyed by image name.
pub type UpstreamImages = BTreeMap<String, BuiltImage>;

/// Everything an executor needs to build one image.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub descriptor: &'a ImageDescriptor,
    pub upstream: &'a UpstreamImages,
}

impl<'a> BuildRequest<'a> {
    pub fn new(descriptor: &'a ImageDescriptor, upstream: &'a UpstreamImages) -> Self {
        Self {
            descriptor,
            upstream,
        }
    }

    pub fn upstream_image(&self, name: &str) -> Option<&'a BuiltImage> {
        self.upstream.get(name)
    }

    /// Image that replaces the Dockerfile's `FROM`, when the descriptor asks
    /// for a rewrite.
    pub fn rewrite_from_image(&self) -> Option<&'a BuiltImage> {
        let parent = self.descriptor.context().rewrite_from.as_deref()?;
        self.upstream_image(parent)
    }
}

#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Build the image described by `request`.
    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltImage, PhaseError>;

    /// Apply `reference` (`repository:tag`) to a built image.
    async fn tag(&self, image: &BuiltImage, reference: &str) -> Result<(), PhaseError>;

    /// Push an applied reference to its registry.
    async fn push(&self, reference: &str) -> Result<(), PhaseError>;
}
