//! イメージプッシュ処理
//!
//! 付与済みの参照名をコンテナレジストリにプッシュします。

use crate::auth::RegistryAuth;
use crate::error::{BuildError, BuildResult};
use crate::progress::ImageProgress;
use bollard::Docker;
use bollard::models::PushImageInfo;
use futures_util::StreamExt;
use imagefleet_core::model::{split_image_tag, validate_tag_name};

/// イメージプッシュを実行するハンドラ
pub struct ImagePusher {
    docker: Docker,
    auth: RegistryAuth,
}

impl ImagePusher {
    /// 認証情報マネージャーを指定して作成
    pub fn with_auth(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    /// `repository:tag` をレジストリにプッシュ
    pub async fn push(&self, reference: &str, progress: &ImageProgress) -> BuildResult<()> {
        let (image, tag) = split_image_tag(reference);

        if !validate_tag_name(&tag) {
            return Err(BuildError::InvalidTag { tag });
        }

        let credentials = self.auth.get_credentials(reference)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag: tag.clone() };

        progress.set_message(&format!("Pushing {}", reference));

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(&image, Some(options), credentials);

        let mut error_message: Option<String> = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        error_message = Some(err);
                    } else {
                        Self::handle_progress(reference, &info, progress);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(err) = error_message {
            return Err(BuildError::PushFailed { message: err });
        }

        tracing::info!("Pushed {}", reference);
        Ok(())
    }

    /// プッシュ進捗を表示
    fn handle_progress(reference: &str, info: &PushImageInfo, progress: &ImageProgress) {
        let Some(status) = &info.status else {
            return;
        };

        match status.as_str() {
            // 準備中は表示をスキップ（ノイズ軽減）
            "Preparing" | "Waiting" => {}
            "Pushing" => {
                let detail = info.progress.as_deref().unwrap_or("");
                progress.set_message(&format!("↑ {} {}", reference, detail));
            }
            _ => {
                tracing::debug!(reference, "{}", status);
                progress.set_message(&format!("{} {}", reference, status));
            }
        }
    }
}
