use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "マニフェストが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: imagefleet.yml, imagefleet.yaml, .imagefleet.yml, .imagefleet.yaml\n\
        または IMAGEFLEET_FILE 環境変数で直接指定できます"
    )]
    ManifestNotFound,

    #[error("マニフェストファイルが存在しません: {0}")]
    FileNotFound(PathBuf),

    #[error("マニフェストの解析に失敗しました: {path}\n理由: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
