use imagefleet_orchestrator::PhaseError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Image '{image}' rewrites FROM to '{parent}', but no built image is available for it")]
    MissingUpstreamImage { image: String, parent: String },

    #[error("Could not determine the id of built image {0}")]
    ImageIdUnavailable(String),

    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Tag failed for {reference}: {message}")]
    TagFailed { reference: String, message: String },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. Dockerfileのパスを確認してください\n\
                     2. マニフェストで明示的にパスを指定してください:\n\
                        dockerfile: path/to/Dockerfile",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     マニフェストのcontextパスを確認してください。",
                    path.display()
                )
            }
            BuildError::AuthFailed { registry, .. } => {
                format!(
                    "{}\n\
                     \n\
                     `docker login {}` を実行してから再試行してください。",
                    self, registry
                )
            }
            _ => format!("{}", self),
        }
    }
}

impl From<BuildError> for PhaseError {
    fn from(error: BuildError) -> Self {
        PhaseError::new(error.to_string())
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
