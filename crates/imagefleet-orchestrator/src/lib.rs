//! imagefleet orchestrator
//!
//! Builds a set of interdependent container images: every image is built only
//! after all of its dependencies succeeded, independent images are built
//! concurrently up to a limit, and a failure skips everything downstream of
//! it while unrelated images carry on.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod state;

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use error::{NodeError, OrchestratorError, PhaseError, Result, TagFailure};
pub use executor::{BuildExecutor, BuildRequest, BuiltImage, UpstreamImages};
pub use orchestrator::{Orchestrator, RunOptions, default_concurrency, run};
pub use pipeline::{BuildResult, Phase, Pipeline};
pub use report::{NodeReport, RunOutcome, RunReport};
pub use state::{NodeStatus, Transition};
