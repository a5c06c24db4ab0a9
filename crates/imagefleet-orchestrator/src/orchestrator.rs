//! Dependency-ordered, concurrent build scheduling
//!
//! A single scheduler loop owns every status change. Workers are spawned
//! tokio tasks that run one image through the [`Pipeline`] and report back;
//! they never touch shared state. Claiming a Ready image (Ready -> Building)
//! is therefore atomic.

use crate::cancel::CancelSignal;
use crate::error::{NodeError, OrchestratorError, Result, StateError};
use crate::executor::{BuildExecutor, BuildRequest, BuiltImage, UpstreamImages};
use crate::pipeline::{BuildResult, Phase, Pipeline};
use crate::report::{NodeReport, RunReport, outcome_of};
use crate::state::{NodeStatus, RunState};
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use imagefleet_core::{DependencyGraph, ImageDescriptor, TagFailurePolicy};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Upper bound for the automatically chosen concurrency.
pub const MAX_DEFAULT_CONCURRENCY: usize = 4;

/// Available parallelism capped at [`MAX_DEFAULT_CONCURRENCY`]; 2 when it
/// cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(MAX_DEFAULT_CONCURRENCY))
        .unwrap_or(2)
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of images in flight at once
    pub concurrency: usize,
    pub tag_failure: TagFailurePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            tag_failure: TagFailurePolicy::default(),
        }
    }
}

impl RunOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }
}

/// Build every image in `descriptors` with at most `concurrency` builds in
/// flight.
pub async fn run(
    descriptors: Vec<ImageDescriptor>,
    concurrency: usize,
    executor: Arc<dyn BuildExecutor>,
) -> Result<RunReport> {
    Orchestrator::new(executor, RunOptions::with_concurrency(concurrency))
        .run(descriptors)
        .await
}

pub struct Orchestrator {
    executor: Arc<dyn BuildExecutor>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn BuildExecutor>, options: RunOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run(&self, descriptors: Vec<ImageDescriptor>) -> Result<RunReport> {
        self.run_with_cancel(descriptors, CancelSignal::never()).await
    }

    pub async fn run_with_cancel(
        &self,
        descriptors: Vec<ImageDescriptor>,
        cancel: CancelSignal,
    ) -> Result<RunReport> {
        self.validate()?;
        let graph = DependencyGraph::build(descriptors)?;
        self.run_graph(graph, cancel).await
    }

    /// Run an already validated graph.
    #[tracing::instrument(skip_all, fields(images = graph.len(), concurrency = self.options.concurrency))]
    pub async fn run_graph(&self, graph: DependencyGraph, cancel: CancelSignal) -> Result<RunReport> {
        self.validate()?;

        let scheduler = Scheduler::new(
            Arc::new(graph),
            Arc::clone(&self.executor),
            Pipeline::new(self.options.tag_failure),
            self.options.concurrency,
        );
        Ok(scheduler.run(cancel).await)
    }

    fn validate(&self) -> Result<()> {
        if self.options.concurrency < 1 {
            return Err(OrchestratorError::ConcurrencyLimitInvalid(
                self.options.concurrency,
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PhaseEvent {
    image: String,
    phase: Phase,
}

struct Scheduler {
    graph: Arc<DependencyGraph>,
    executor: Arc<dyn BuildExecutor>,
    pipeline: Pipeline,
    concurrency: usize,
    state: RunState,
    /// image -> dependencies not yet succeeded
    remaining: HashMap<String, usize>,
    ready: VecDeque<String>,
    built: HashMap<String, BuiltImage>,
    /// Once set, nothing leaves Pending any more.
    cancelled: bool,
}

impl Scheduler {
    fn new(
        graph: Arc<DependencyGraph>,
        executor: Arc<dyn BuildExecutor>,
        pipeline: Pipeline,
        concurrency: usize,
    ) -> Self {
        let state = RunState::new(graph.names());
        let remaining = graph
            .names()
            .map(|name| (name.to_string(), graph.dependencies(name).len()))
            .collect();

        Self {
            graph,
            executor,
            pipeline,
            concurrency,
            state,
            remaining,
            ready: VecDeque::new(),
            built: HashMap::new(),
            cancelled: false,
        }
    }

    async fn run(mut self, mut cancel: CancelSignal) -> RunReport {
        let started_at = Utc::now();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PhaseEvent>();
        let mut in_flight = FuturesUnordered::new();

        self.observe_cancel(&cancel);
        let graph = Arc::clone(&self.graph);
        if !self.cancelled {
            for name in graph.names() {
                if self.remaining.get(name) == Some(&0) {
                    self.mark_ready(name);
                }
            }
        }

        loop {
            self.observe_cancel(&cancel);

            if !self.cancelled {
                while in_flight.len() < self.concurrency {
                    let Some(name) = self.ready.pop_front() else {
                        break;
                    };
                    if self.state.status(&name) != Some(NodeStatus::Ready) {
                        continue;
                    }
                    log_violation(self.state.transition(&name, NodeStatus::Building));
                    debug!(image = %name, in_flight = in_flight.len() + 1, "Dispatching");
                    in_flight.push(spawn_worker(
                        name.clone(),
                        Arc::clone(&self.graph),
                        Arc::clone(&self.executor),
                        self.pipeline,
                        self.upstream_of(&name),
                        events_tx.clone(),
                    ));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !self.cancelled => self.observe_cancel(&cancel),
                Some(event) = events_rx.recv() => self.apply_phase(event),
                Some((name, joined)) = in_flight.next() => {
                    let result = joined.unwrap_or_else(|e| {
                        error!(image = %name, error = %e, "Worker task failed");
                        BuildResult::failed(NodeError::Internal {
                            message: e.to_string(),
                        })
                    });
                    self.observe_cancel(&cancel);
                    self.complete(&name, result);
                }
            }
        }

        for name in self.state.unfinished() {
            let reason = if self.cancelled {
                NodeError::Cancelled
            } else {
                NodeError::Internal {
                    message: "dependencies never completed".to_string(),
                }
            };
            log_violation(self.state.fail(&name, NodeStatus::Skipped, reason));
        }

        let (mut nodes, timeline) = self.state.into_parts();
        let images: Vec<NodeReport> = graph
            .names()
            .map(|name| NodeReport::from_state(name, nodes.remove(name).unwrap_or_default()))
            .collect();
        let outcome = outcome_of(&images, self.cancelled);

        info!(
            ?outcome,
            succeeded = images.iter().filter(|i| i.status == NodeStatus::Succeeded).count(),
            failed = images.iter().filter(|i| i.status == NodeStatus::Failed).count(),
            skipped = images.iter().filter(|i| i.status == NodeStatus::Skipped).count(),
            "Run finished"
        );

        RunReport {
            outcome,
            started_at,
            finished_at: Utc::now(),
            images,
            timeline,
        }
    }

    fn observe_cancel(&mut self, cancel: &CancelSignal) {
        if !self.cancelled && cancel.is_cancelled() {
            self.cancelled = true;
            warn!("Run cancelled; waiting for in-flight builds");
        }
    }

    fn mark_ready(&mut self, name: &str) {
        log_violation(self.state.transition(name, NodeStatus::Ready));
        self.ready.push_back(name.to_string());
    }

    fn upstream_of(&self, name: &str) -> UpstreamImages {
        self.graph
            .dependencies(name)
            .into_iter()
            .filter_map(|dep| {
                self.built
                    .get(dep)
                    .map(|image| (dep.to_string(), image.clone()))
            })
            .collect()
    }

    fn apply_phase(&mut self, event: PhaseEvent) {
        let next = match event.phase {
            Phase::Build => NodeStatus::Building,
            Phase::Tag => NodeStatus::Tagging,
            Phase::Push => NodeStatus::Pushing,
        };

        match self.state.status(&event.image) {
            Some(current) if current.is_active() && current.can_transition_to(next) => {
                log_violation(self.state.transition(&event.image, next));
            }
            current => {
                debug!(image = %event.image, ?current, ?next, "Ignoring stale phase event");
            }
        }
    }

    fn complete(&mut self, name: &str, result: BuildResult) {
        let graph = Arc::clone(&self.graph);
        let BuildResult {
            image,
            tagged,
            pushed,
            error,
        } = result;

        if let Some(node) = self.state.get_mut(name) {
            node.image = image.clone();
            node.tagged = tagged;
            node.pushed = pushed;
        }

        match error {
            None => {
                log_violation(self.state.transition(name, NodeStatus::Succeeded));
                info!(image = name, "Image succeeded");
                if let Some(image) = image {
                    self.built.insert(name.to_string(), image);
                }

                for child in graph.dependents(name) {
                    let Some(count) = self.remaining.get_mut(child) else {
                        continue;
                    };
                    *count = count.saturating_sub(1);
                    if *count == 0
                        && !self.cancelled
                        && self.state.status(child) == Some(NodeStatus::Pending)
                    {
                        self.mark_ready(child);
                    }
                }
            }
            Some(error) => {
                error!(image = name, error = %error, "Image failed");
                log_violation(self.state.fail(name, NodeStatus::Failed, error));

                for descendant in graph.descendants(name) {
                    if matches!(
                        self.state.status(descendant),
                        Some(NodeStatus::Pending | NodeStatus::Ready)
                    ) {
                        warn!(image = descendant, cause = name, "Skipping image");
                        log_violation(self.state.fail(
                            descendant,
                            NodeStatus::Skipped,
                            NodeError::UpstreamFailed {
                                root: name.to_string(),
                            },
                        ));
                    }
                }
            }
        }
    }
}

/// Spawn one pipeline run. The returned future keeps the image name so a
/// panicking task can still be attributed.
fn spawn_worker(
    name: String,
    graph: Arc<DependencyGraph>,
    executor: Arc<dyn BuildExecutor>,
    pipeline: Pipeline,
    upstream: UpstreamImages,
    events: mpsc::UnboundedSender<PhaseEvent>,
) -> impl Future<Output = (String, std::result::Result<BuildResult, JoinError>)> {
    let image = name.clone();
    let handle = tokio::spawn(async move {
        let Some(descriptor) = graph.get(&image) else {
            return BuildResult::failed(NodeError::Internal {
                message: format!("image '{}' is not in the graph", image),
            });
        };

        let request = BuildRequest::new(descriptor, &upstream);
        let report_phase = |phase: Phase| {
            let _ = events.send(PhaseEvent {
                image: image.clone(),
                phase,
            });
        };
        pipeline
            .run(executor.as_ref(), &request, &report_phase)
            .await
    });

    async move { (name, handle.await) }
}

fn log_violation(result: std::result::Result<(), StateError>) {
    if let Err(e) = result {
        error!(error = %e, "State machine violation");
    }
}
