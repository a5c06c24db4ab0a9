//! Docker を使わずにビルド計画だけを確認するエグゼキュータ

use crate::resolver::BuildResolver;
use async_trait::async_trait;
use imagefleet_orchestrator::{BuildExecutor, BuildRequest, BuiltImage, PhaseError};
use std::sync::Mutex;

/// Dockerfile とコンテキストの解決だけを行い、ビルド・タグ・プッシュは
/// ログに出すだけ。
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    actions: Mutex<Vec<String>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 実行したはずの操作（"build app" など）
    pub fn actions(&self) -> Vec<String> {
        self.actions
            .lock()
            .map(|actions| actions.clone())
            .unwrap_or_default()
    }

    fn record(&self, action: String) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }
}

#[async_trait]
impl BuildExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltImage, PhaseError> {
        let prepared = BuildResolver::prepare(request)?;
        let name = request.descriptor.name();

        tracing::info!(
            image = name,
            context = %prepared.context_dir.display(),
            dockerfile = %prepared.dockerfile_path.display(),
            "[dry-run] build"
        );
        self.record(format!("build {}", name));

        Ok(BuiltImage::new(format!("dry-run:{}", name)))
    }

    async fn tag(&self, image: &BuiltImage, reference: &str) -> Result<(), PhaseError> {
        tracing::info!(id = %image.id, reference, "[dry-run] tag");
        self.record(format!("tag {}", reference));
        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<(), PhaseError> {
        tracing::info!(reference, "[dry-run] push");
        self.record(format!("push {}", reference));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagefleet_core::{BuildContext, ImageDescriptor};
    use imagefleet_orchestrator::{NodeStatus, Orchestrator, RunOptions};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_dry_run_build() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();

        let descriptor = ImageDescriptor::builder("app")
            .context_path(temp_dir.path())
            .build()
            .unwrap();
        let upstream = Default::default();
        let executor = DryRunExecutor::new();

        let image = tokio_test::block_on(
            executor.build(&BuildRequest::new(&descriptor, &upstream)),
        )
        .unwrap();
        assert_eq!(image.id, "dry-run:app");
        assert_eq!(executor.actions(), vec!["build app"]);
    }

    #[test]
    fn test_dry_run_missing_dockerfile() {
        let temp_dir = tempdir().unwrap();
        let descriptor = ImageDescriptor::builder("app")
            .context_path(temp_dir.path())
            .build()
            .unwrap();
        let upstream = Default::default();

        let result = tokio_test::block_on(
            DryRunExecutor::new().build(&BuildRequest::new(&descriptor, &upstream)),
        );
        assert!(result.unwrap_err().message.contains("Dockerfile not found"));
    }

    #[tokio::test]
    async fn test_dry_run_through_orchestrator() {
        let temp_dir = tempdir().unwrap();
        for dir in ["base", "app"] {
            fs::create_dir(temp_dir.path().join(dir)).unwrap();
        }
        fs::write(temp_dir.path().join("base/Dockerfile"), "FROM alpine\n").unwrap();
        fs::write(temp_dir.path().join("app/Dockerfile"), "FROM base\n").unwrap();

        let base = ImageDescriptor::builder("base")
            .context_path(temp_dir.path().join("base"))
            .tag("registry/base:1")
            .push(true)
            .build()
            .unwrap();
        let mut app_context = BuildContext::new(temp_dir.path().join("app"));
        app_context.rewrite_from = Some("base".to_string());
        let app = ImageDescriptor::builder("app")
            .context(app_context)
            .depends_on("base")
            .build()
            .unwrap();

        let executor = Arc::new(DryRunExecutor::new());
        let report = Orchestrator::new(executor.clone(), RunOptions::with_concurrency(2))
            .run(vec![base, app])
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.status_of("app"), Some(NodeStatus::Succeeded));
        assert_eq!(
            executor.actions(),
            vec!["build base", "tag registry/base:1", "push registry/base:1", "build app"]
        );
    }
}
