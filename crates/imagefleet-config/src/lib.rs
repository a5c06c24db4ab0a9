pub mod error;

pub use error::*;

use imagefleet_core::Manifest;
use std::path::{Path, PathBuf};

/// マニフェストのパスを直接指定する環境変数
pub const MANIFEST_ENV: &str = "IMAGEFLEET_FILE";

/// カレントディレクトリで探すファイル名（優先順）
const CANDIDATES: [&str; 4] = [
    "imagefleet.yml",
    "imagefleet.yaml",
    ".imagefleet.yml",
    ".imagefleet.yaml",
];

/// 読み込んだマニフェストと、その場所
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// マニフェストファイルのパス
    pub path: PathBuf,
    /// コンテキストパスの基準ディレクトリ（マニフェストのあるディレクトリ）
    pub base_dir: PathBuf,
    pub manifest: Manifest,
}

/// マニフェストファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 IMAGEFLEET_FILE (直接パス指定)
/// 2. カレントディレクトリ: imagefleet.yml, imagefleet.yaml, .imagefleet.yml, .imagefleet.yaml
pub fn find_manifest_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(manifest_path) = std::env::var(MANIFEST_ENV) {
        let path = PathBuf::from(manifest_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(path));
    }

    // 2. カレントディレクトリで検索
    let current_dir = std::env::current_dir()?;
    find_manifest_in(&current_dir)
}

/// 指定ディレクトリ内でマニフェストを探す
pub fn find_manifest_in(dir: &Path) -> Result<PathBuf> {
    CANDIDATES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
        .ok_or(ConfigError::ManifestNotFound)
}

/// マニフェストを読み込む
///
/// `path` が `None` の場合は [`find_manifest_file`] で探します。
pub fn load_manifest(path: Option<&Path>) -> Result<LoadedManifest> {
    let path = match path {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => return Err(ConfigError::FileNotFound(path.to_path_buf())),
        None => find_manifest_file()?,
    };

    let content = std::fs::read_to_string(&path)?;
    let manifest = parse_manifest(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };

    tracing::debug!(
        path = %path.display(),
        images = manifest.images.len(),
        "Loaded manifest"
    );

    Ok(LoadedManifest {
        path,
        base_dir,
        manifest,
    })
}

/// YAML 文字列をマニフェストとして解析
pub fn parse_manifest(content: &str) -> std::result::Result<Manifest, serde_yaml::Error> {
    serde_yaml::from_str(content)
}
