//! ビルドコンテキストの作成
//!
//! コンテキストディレクトリを tar.gz にまとめます。`ignore` パターンと
//! `.dockerignore` に一致するパスは除外し、Dockerfile は渡された内容で
//! `Dockerfile` として格納します。

use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use glob::Pattern;
use std::fs;
use std::path::Path;
use tar::Builder;

const DOCKERIGNORE: &str = ".dockerignore";

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    pub fn create_context(
        context_path: &Path,
        dockerfile: &[u8],
        ignore: &[String],
    ) -> BuildResult<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        let patterns = Self::load_patterns(context_path, ignore)?;

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);

            Self::append_tree(&mut tar, context_path, Path::new(""), &patterns)?;

            // Dockerfileを "Dockerfile" として追加
            let mut header = tar::Header::new_gnu();
            header.set_path("Dockerfile").map_err(|e| {
                BuildError::InvalidConfig(format!("Failed to set Dockerfile path: {}", e))
            })?;
            header.set_size(dockerfile.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            tar.append(&header, dockerfile).map_err(BuildError::Io)?;

            tar.into_inner()
                .and_then(|encoder| encoder.finish())
                .map_err(BuildError::Io)?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        // コンテキストサイズの警告
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    /// マニフェストの `ignore` と `.dockerignore` を合わせた除外パターン
    fn load_patterns(context_path: &Path, ignore: &[String]) -> BuildResult<Vec<Pattern>> {
        let mut raw: Vec<String> = ignore.to_vec();

        let dockerignore = context_path.join(DOCKERIGNORE);
        if dockerignore.is_file() {
            let content = fs::read_to_string(&dockerignore)?;
            for line in content.lines().map(str::trim) {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if line.starts_with('!') {
                    tracing::debug!(pattern = line, "Negated .dockerignore patterns are not supported");
                    continue;
                }
                raw.push(line.to_string());
            }
        }

        raw.iter()
            .map(|p| p.trim_start_matches('/').trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|p| Pattern::new(p).map_err(BuildError::from))
            .collect()
    }

    fn is_ignored(relative: &Path, patterns: &[Pattern]) -> bool {
        patterns.iter().any(|p| p.matches_path(relative))
    }

    fn append_tree<W: std::io::Write>(
        tar: &mut Builder<W>,
        root: &Path,
        relative: &Path,
        patterns: &[Pattern],
    ) -> BuildResult<()> {
        let dir = root.join(relative);
        let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let rel = relative.join(entry.file_name());
            // ルートの Dockerfile は後から差し替える
            if rel == Path::new("Dockerfile") || Self::is_ignored(&rel, patterns) {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                tar.append_dir(&rel, entry.path())?;
                Self::append_tree(tar, root, &rel, patterns)?;
            } else {
                tar.append_path_with_name(entry.path(), &rel)?;
            }
        }

        Ok(())
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 ignore または .dockerignore で不要なファイルを除外することを推奨します。",
                size / 1024 / 1024
            );
        }
    }
}
