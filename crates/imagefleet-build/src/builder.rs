use crate::error::{BuildError, BuildResult};
use crate::progress::ImageProgress;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use std::collections::{BTreeMap, HashMap};

/// ビルド時のキャッシュ・pull 設定
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildFlags {
    pub no_cache: bool,
    /// ベースイメージを常にpull
    pub pull: bool,
}

pub struct ImageBuilder {
    docker: Docker,
}

impl ImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// イメージをビルドし、イメージIDを返す
    pub async fn build_image(
        &self,
        context_data: Vec<u8>,
        reference: &str,
        build_args: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
        flags: BuildFlags,
        progress: &ImageProgress,
    ) -> BuildResult<String> {
        tracing::info!("Building image: {}", reference);

        let build_args_refs: HashMap<&str, &str> = build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let labels_refs: HashMap<&str, &str> = labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: reference,
            buildargs: build_args_refs,
            labels: labels_refs,
            nocache: flags.no_cache,
            pull: flags.pull,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };

        tracing::debug!("Build options: {:?}", options);

        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => Self::handle_build_output(reference, output, progress)?,
                Err(e) => return Err(BuildError::DockerConnection(e)),
            }
        }

        let id = self.image_id(reference).await?;
        tracing::info!("Successfully built: {} ({})", reference, id);
        Ok(id)
    }

    /// ビルド出力の処理
    fn handle_build_output(
        reference: &str,
        output: bollard::models::BuildInfo,
        progress: &ImageProgress,
    ) -> BuildResult<()> {
        if let Some(stream) = output.stream {
            let line = stream.trim();
            if !line.is_empty() {
                tracing::debug!(image = reference, "{}", line);
                progress.set_message(line);
            }
        }

        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        if let Some(status) = output.status {
            // ステータスメッセージ（pull等）
            progress.set_message(&status);
        }

        Ok(())
    }

    /// ビルド済みイメージのIDを取得
    pub async fn image_id(&self, reference: &str) -> BuildResult<String> {
        let inspect = self.docker.inspect_image(reference).await?;
        inspect
            .id
            .ok_or_else(|| BuildError::ImageIdUnavailable(reference.to_string()))
    }

    /// イメージに参照名を付与
    pub async fn tag_image(&self, image_id: &str, repo: &str, tag: &str) -> BuildResult<()> {
        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions::<String> {
            repo: repo.to_string(),
            tag: tag.to_string(),
        };

        self.docker
            .tag_image(image_id, Some(options))
            .await
            .map_err(|e| BuildError::TagFailed {
                reference: format!("{}:{}", repo, tag),
                message: e.to_string(),
            })
    }
}
