//! Docker デーモンを使うビルドエグゼキュータ

use crate::auth::RegistryAuth;
use crate::builder::{BuildFlags, ImageBuilder};
use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use crate::progress::{BuildProgress, ImageProgress};
use crate::pusher::ImagePusher;
use crate::resolver::{BuildResolver, PreparedBuild};
use async_trait::async_trait;
use bollard::Docker;
use imagefleet_core::model::split_image_tag;
use imagefleet_orchestrator::{BuildExecutor, BuildRequest, BuiltImage, PhaseError};

/// ビルド時に付ける作業用の参照名
pub fn build_reference(image: &str) -> String {
    format!("imagefleet-{}:latest", image)
}

pub struct DockerExecutor {
    builder: ImageBuilder,
    pusher: ImagePusher,
    flags: BuildFlags,
    progress: BuildProgress,
}

impl DockerExecutor {
    pub fn new(docker: Docker, flags: BuildFlags, progress: BuildProgress) -> Self {
        Self {
            builder: ImageBuilder::new(docker.clone()),
            pusher: ImagePusher::with_auth(docker, RegistryAuth::new()),
            flags,
            progress,
        }
    }

    /// ローカルの Docker デーモンに接続
    pub async fn connect(flags: BuildFlags, progress: BuildProgress) -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        tracing::debug!("Connected to Docker daemon");
        Ok(Self::new(docker, flags, progress))
    }

    async fn build_prepared(&self, prepared: PreparedBuild) -> BuildResult<BuiltImage> {
        let progress = self.progress.start(&prepared.image);

        match self.build_in_context(prepared, &progress).await {
            Ok(id) => {
                progress.finish_success();
                Ok(BuiltImage::new(id))
            }
            Err(e) => {
                progress.finish_error(&e.to_string());
                tracing::warn!("{}", e.user_message());
                Err(e)
            }
        }
    }

    async fn build_in_context(
        &self,
        prepared: PreparedBuild,
        progress: &ImageProgress,
    ) -> BuildResult<String> {
        let reference = build_reference(&prepared.image);
        let PreparedBuild {
            context_dir,
            dockerfile,
            build_args,
            labels,
            ignore,
            ..
        } = prepared;

        let context_data = tokio::task::spawn_blocking(move || {
            ContextBuilder::create_context(&context_dir, &dockerfile, &ignore)
        })
        .await
        .map_err(|e| BuildError::BuildFailed(format!("context task failed: {}", e)))??;

        self.builder
            .build_image(
                context_data,
                &reference,
                &build_args,
                &labels,
                self.flags,
                progress,
            )
            .await
    }
}

#[async_trait]
impl BuildExecutor for DockerExecutor {
    fn name(&self) -> &str {
        "docker"
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltImage, PhaseError> {
        let prepared = BuildResolver::prepare(request).inspect_err(|e| {
            tracing::warn!("{}", e.user_message());
        })?;
        Ok(self.build_prepared(prepared).await?)
    }

    async fn tag(&self, image: &BuiltImage, reference: &str) -> Result<(), PhaseError> {
        let (repo, tag) = split_image_tag(reference);
        self.builder.tag_image(&image.id, &repo, &tag).await?;
        tracing::debug!(id = %image.id, reference, "Tagged image");
        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<(), PhaseError> {
        let progress = self.progress.start(reference);
        match self.pusher.push(reference, &progress).await {
            Ok(()) => {
                progress.finish_success();
                Ok(())
            }
            Err(e) => {
                progress.finish_error(&e.to_string());
                tracing::warn!("{}", e.user_message());
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagefleet_core::ImageDescriptor;
    use imagefleet_orchestrator::UpstreamImages;

    #[test]
    fn test_build_reference() {
        assert_eq!(build_reference("app"), "imagefleet-app:latest");
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_and_tag() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine:latest\n").unwrap();

        let executor = DockerExecutor::connect(BuildFlags::default(), BuildProgress::hidden())
            .await
            .unwrap();
        let descriptor = ImageDescriptor::builder("itest")
            .context_path(temp_dir.path())
            .build()
            .unwrap();
        let upstream = UpstreamImages::new();

        let image = executor
            .build(&BuildRequest::new(&descriptor, &upstream))
            .await
            .unwrap();
        executor.tag(&image, "imagefleet-itest:tagged").await.unwrap();
    }
}
