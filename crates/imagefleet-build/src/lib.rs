//! imagefleet Docker build functionality
//!
//! Dockerfile resolution and `FROM` rewriting, build context creation, image
//! building, tagging and pushing to container registries, exposed to the
//! orchestrator as [`DockerExecutor`]. [`DryRunExecutor`] resolves inputs
//! without talking to Docker.

pub mod auth;
pub mod builder;
pub mod context;
pub mod docker;
pub mod dry_run;
pub mod error;
pub mod progress;
pub mod pusher;
pub mod resolver;

pub use auth::RegistryAuth;
pub use builder::{BuildFlags, ImageBuilder};
pub use context::ContextBuilder;
pub use docker::DockerExecutor;
pub use dry_run::DryRunExecutor;
pub use error::{BuildError, BuildResult};
pub use progress::BuildProgress;
pub use pusher::ImagePusher;
pub use resolver::{BuildResolver, PreparedBuild, rewrite_from};
