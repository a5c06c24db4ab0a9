//! Build, tag and push for a single image

use crate::error::{NodeError, TagFailure};
use crate::executor::{BuildExecutor, BuildRequest, BuiltImage};
use imagefleet_core::TagFailurePolicy;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Phase a worker moves into after the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Build,
    Tag,
    Push,
}

/// Outcome of running one image through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub image: Option<BuiltImage>,
    /// References applied successfully
    pub tagged: Vec<String>,
    /// References pushed successfully
    pub pushed: Vec<String>,
    pub error: Option<NodeError>,
}

impl BuildResult {
    pub fn failed(error: NodeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        match self.error.as_ref()? {
            NodeError::Build { .. } => Some(Phase::Build),
            NodeError::Tag { .. } => Some(Phase::Tag),
            NodeError::Push { .. } => Some(Phase::Push),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline {
    pub tag_failure: TagFailurePolicy,
}

impl Pipeline {
    pub fn new(tag_failure: TagFailurePolicy) -> Self {
        Self { tag_failure }
    }

    /// Build the image, apply its tags and push them when requested.
    ///
    /// A failed build skips tagging and pushing. Only tags that were applied
    /// are pushed. With [`TagFailurePolicy::Abort`] the first tag failure
    /// ends the pipeline without pushing.
    ///
    /// `on_phase` is called when the image moves into tagging or pushing.
    pub async fn run(
        &self,
        executor: &dyn BuildExecutor,
        request: &BuildRequest<'_>,
        on_phase: &(dyn Fn(Phase) + Send + Sync),
    ) -> BuildResult {
        let descriptor = request.descriptor;
        let name = descriptor.name();
        let mut result = BuildResult::default();

        info!(image = name, executor = executor.name(), "Building image");
        let image = match executor.build(request).await {
            Ok(image) => image,
            Err(e) => {
                warn!(image = name, error = %e, "Build failed");
                result.error = Some(NodeError::Build { message: e.message });
                return result;
            }
        };
        debug!(image = name, id = %image.id, "Build finished");
        result.image = Some(image.clone());

        let mut tag_failures = Vec::new();
        if !descriptor.tags().is_empty() {
            on_phase(Phase::Tag);
            for reference in descriptor.tags() {
                match executor.tag(&image, reference).await {
                    Ok(()) => {
                        debug!(image = name, reference = %reference, "Tagged");
                        result.tagged.push(reference.clone());
                    }
                    Err(e) => {
                        warn!(image = name, reference = %reference, error = %e, "Tag failed");
                        tag_failures.push(TagFailure {
                            reference: reference.clone(),
                            message: e.message,
                        });
                        if self.tag_failure == TagFailurePolicy::Abort {
                            break;
                        }
                    }
                }
            }
        }

        let aborted = !tag_failures.is_empty() && self.tag_failure == TagFailurePolicy::Abort;
        let mut push_failures = Vec::new();
        if descriptor.push() && !aborted && !result.tagged.is_empty() {
            on_phase(Phase::Push);
            for reference in result.tagged.clone() {
                match executor.push(&reference).await {
                    Ok(()) => {
                        info!(image = name, reference = %reference, "Pushed");
                        result.pushed.push(reference);
                    }
                    Err(e) => {
                        warn!(image = name, reference = %reference, error = %e, "Push failed");
                        push_failures.push(TagFailure {
                            reference,
                            message: e.message,
                        });
                    }
                }
            }
        }

        if !tag_failures.is_empty() {
            result.error = Some(NodeError::Tag {
                failures: tag_failures,
            });
        } else if !push_failures.is_empty() {
            result.error = Some(NodeError::Push {
                failures: push_failures,
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhaseError;
    use crate::executor::UpstreamImages;
    use async_trait::async_trait;
    use imagefleet_core::ImageDescriptor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeExecutor {
        fail_build: bool,
        fail_tags: Vec<String>,
        fail_pushes: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BuildExecutor for FakeExecutor {
        fn name(&self) -> &str {
            "fake"
        }

        async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltImage, PhaseError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("build {}", request.descriptor.name()));
            if self.fail_build {
                return Err(PhaseError::new("boom"));
            }
            Ok(BuiltImage::new("sha256:1"))
        }

        async fn tag(&self, _image: &BuiltImage, reference: &str) -> Result<(), PhaseError> {
            self.calls.lock().unwrap().push(format!("tag {}", reference));
            if self.fail_tags.iter().any(|r| r == reference) {
                return Err(PhaseError::new("tag rejected"));
            }
            Ok(())
        }

        async fn push(&self, reference: &str) -> Result<(), PhaseError> {
            self.calls.lock().unwrap().push(format!("push {}", reference));
            if self.fail_pushes.iter().any(|r| r == reference) {
                return Err(PhaseError::new("denied"));
            }
            Ok(())
        }
    }

    fn descriptor(push: bool) -> ImageDescriptor {
        ImageDescriptor::builder("app")
            .tag("registry/app:1")
            .tag("registry/app:latest")
            .push(push)
            .build()
            .unwrap()
    }

    async fn run(executor: &FakeExecutor, pipeline: Pipeline, push: bool) -> (BuildResult, Vec<Phase>) {
        let descriptor = descriptor(push);
        let upstream = UpstreamImages::new();
        let request = BuildRequest::new(&descriptor, &upstream);
        let phases = Mutex::new(Vec::new());
        let result = pipeline
            .run(executor, &request, &|phase| phases.lock().unwrap().push(phase))
            .await;
        (result, phases.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_build_tag_push() {
        let executor = FakeExecutor::default();
        let (result, phases) = run(&executor, Pipeline::default(), true).await;

        assert!(result.is_success());
        assert_eq!(result.image, Some(BuiltImage::new("sha256:1")));
        assert_eq!(result.tagged.len(), 2);
        assert_eq!(result.pushed, result.tagged);
        assert_eq!(phases, vec![Phase::Tag, Phase::Push]);
        assert_eq!(
            executor.calls(),
            vec![
                "build app",
                "tag registry/app:1",
                "tag registry/app:latest",
                "push registry/app:1",
                "push registry/app:latest",
            ]
        );
    }

    #[tokio::test]
    async fn test_build_failure_short_circuits() {
        let executor = FakeExecutor {
            fail_build: true,
            ..Default::default()
        };
        let (result, phases) = run(&executor, Pipeline::default(), true).await;

        assert_eq!(result.failed_phase(), Some(Phase::Build));
        assert!(result.image.is_none());
        assert!(phases.is_empty());
        assert_eq!(executor.calls(), vec!["build app"]);
    }

    #[tokio::test]
    async fn test_tag_failure_continue_pushes_applied_tags() {
        let executor = FakeExecutor {
            fail_tags: vec!["registry/app:1".to_string()],
            ..Default::default()
        };
        let (result, _) = run(&executor, Pipeline::default(), true).await;

        assert_eq!(result.failed_phase(), Some(Phase::Tag));
        assert_eq!(result.tagged, vec!["registry/app:latest".to_string()]);
        assert_eq!(result.pushed, vec!["registry/app:latest".to_string()]);
        assert!(!executor.calls().contains(&"push registry/app:1".to_string()));
    }

    #[tokio::test]
    async fn test_tag_failure_abort_stops() {
        let executor = FakeExecutor {
            fail_tags: vec!["registry/app:1".to_string()],
            ..Default::default()
        };
        let (result, phases) = run(&executor, Pipeline::new(TagFailurePolicy::Abort), true).await;

        assert_eq!(result.failed_phase(), Some(Phase::Tag));
        assert!(result.tagged.is_empty());
        assert!(result.pushed.is_empty());
        assert_eq!(phases, vec![Phase::Tag]);
        assert_eq!(executor.calls(), vec!["build app", "tag registry/app:1"]);
    }

    #[tokio::test]
    async fn test_push_failure_marks_failed() {
        let executor = FakeExecutor {
            fail_pushes: vec!["registry/app:latest".to_string()],
            ..Default::default()
        };
        let (result, _) = run(&executor, Pipeline::default(), true).await;

        assert_eq!(result.failed_phase(), Some(Phase::Push));
        assert_eq!(result.pushed, vec!["registry/app:1".to_string()]);
        match result.error {
            Some(NodeError::Push { failures }) => {
                assert_eq!(failures[0].reference, "registry/app:latest");
                assert_eq!(failures[0].message, "denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_push_when_disabled() {
        let executor = FakeExecutor::default();
        let (result, phases) = run(&executor, Pipeline::default(), false).await;

        assert!(result.is_success());
        assert!(result.pushed.is_empty());
        assert_eq!(phases, vec![Phase::Tag]);
    }
}
