//! Dockerfile とビルドコンテキストの解決

use crate::error::{BuildError, BuildResult};
use imagefleet_orchestrator::BuildRequest;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Docker に渡す直前まで解決済みのビルド入力
#[derive(Debug, Clone)]
pub struct PreparedBuild {
    pub image: String,
    pub context_dir: PathBuf,
    pub dockerfile_path: PathBuf,
    /// `FROM` の書き換え後の Dockerfile
    pub dockerfile: Vec<u8>,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub ignore: Vec<String>,
}

pub struct BuildResolver;

impl BuildResolver {
    /// ビルド要求からコンテキスト・Dockerfile・引数を解決
    pub fn prepare(request: &BuildRequest<'_>) -> BuildResult<PreparedBuild> {
        let descriptor = request.descriptor;
        let context = descriptor.context();

        let context_dir = Self::resolve_context(&context.path)?;
        let dockerfile_path = Self::resolve_dockerfile(&context_dir, context.dockerfile.as_ref())?;
        let mut dockerfile = std::fs::read_to_string(&dockerfile_path)?;

        if let Some(parent) = &context.rewrite_from {
            let upstream =
                request
                    .rewrite_from_image()
                    .ok_or_else(|| BuildError::MissingUpstreamImage {
                        image: descriptor.name().to_string(),
                        parent: parent.clone(),
                    })?;
            dockerfile = rewrite_from(&dockerfile, &upstream.id)?;
            tracing::debug!(
                image = descriptor.name(),
                from = %upstream.id,
                "Rewrote FROM instruction"
            );
        }

        for key in context.build_args.keys() {
            Self::validate_build_arg(key);
        }

        Ok(PreparedBuild {
            image: descriptor.name().to_string(),
            context_dir,
            dockerfile_path,
            dockerfile: dockerfile.into_bytes(),
            build_args: context.build_args.clone(),
            labels: context.labels.clone(),
            ignore: context.ignore.clone(),
        })
    }

    /// ビルドコンテキストのパスを検証
    pub fn resolve_context(context: &std::path::Path) -> BuildResult<PathBuf> {
        if !context.exists() {
            return Err(BuildError::ContextNotFound(context.to_path_buf()));
        }

        if !context.is_dir() {
            return Err(BuildError::InvalidConfig(format!(
                "Build context is not a directory: {}",
                context.display()
            )));
        }

        Ok(context.to_path_buf())
    }

    /// Dockerfileのパスを解決
    ///
    /// 明示的な指定はコンテキストからの相対パス。指定がなければ
    /// `<context>/Dockerfile`。
    pub fn resolve_dockerfile(
        context_dir: &std::path::Path,
        dockerfile: Option<&PathBuf>,
    ) -> BuildResult<PathBuf> {
        let path = match dockerfile {
            Some(dockerfile) => context_dir.join(dockerfile),
            None => context_dir.join("Dockerfile"),
        };

        if path.is_file() {
            Ok(path)
        } else {
            Err(BuildError::DockerfileNotFound(path))
        }
    }

    /// ビルド引数の検証（機密情報の警告）
    pub fn validate_build_arg(key: &str) {
        let sensitive_patterns = ["password", "token", "secret", "api_key", "private_key"];

        let key_lower = key.to_lowercase();
        if sensitive_patterns.iter().any(|p| key_lower.contains(p)) {
            tracing::warn!(
                "警告: ビルド引数 '{}' は機密情報を含む可能性があります。\n\
                 ビルド引数はイメージ履歴に記録されます。\n\
                 機密情報はビルド引数ではなく、シークレットマウントを使用してください。",
                key
            );
        }
    }
}

/// 最初の `FROM` 命令のイメージを `image` に置き換える
///
/// `--platform=...` などのフラグと `AS <stage>` はそのまま残します。
pub fn rewrite_from(dockerfile: &str, image: &str) -> BuildResult<String> {
    let mut rewritten = false;
    let mut lines = Vec::new();

    for line in dockerfile.lines() {
        if !rewritten && let Some(replaced) = replace_from_image(line, image) {
            lines.push(replaced);
            rewritten = true;
            continue;
        }
        lines.push(line.to_string());
    }

    if !rewritten {
        return Err(BuildError::InvalidConfig(
            "Dockerfile has no FROM instruction to rewrite".to_string(),
        ));
    }

    let mut result = lines.join("\n");
    if dockerfile.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

fn replace_from_image(line: &str, image: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    let mut tokens = trimmed.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("FROM") {
        return None;
    }

    let mut parts = vec![trimmed[..4].to_string()];
    let mut replaced = false;
    for token in tokens {
        if !replaced && !token.starts_with("--") {
            parts.push(image.to_string());
            replaced = true;
        } else {
            parts.push(token.to_string());
        }
    }

    replaced.then(|| format!("{}{}", indent, parts.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagefleet_core::{BuildContext, ImageDescriptor};
    use imagefleet_orchestrator::{BuiltImage, UpstreamImages};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_rewrite_from_simple() {
        let result = rewrite_from("FROM base:latest\nRUN make\n", "sha256:abc").unwrap();
        assert_eq!(result, "FROM sha256:abc\nRUN make\n");
    }

    #[test]
    fn test_rewrite_from_keeps_stage_and_flags() {
        let dockerfile = "# syntax\nARG VERSION=1\nfrom --platform=linux/amd64 base AS builder\nFROM scratch\n";
        let result = rewrite_from(dockerfile, "sha256:abc").unwrap();
        assert_eq!(
            result,
            "# syntax\nARG VERSION=1\nfrom --platform=linux/amd64 sha256:abc AS builder\nFROM scratch\n"
        );
    }

    #[test]
    fn test_rewrite_from_missing() {
        let result = rewrite_from("RUN echo hi\n", "sha256:abc");
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn test_resolve_dockerfile_default() {
        let temp_dir = tempdir().unwrap();
        let dockerfile_path = temp_dir.path().join("Dockerfile");
        fs::write(&dockerfile_path, "FROM alpine").unwrap();

        let result = BuildResolver::resolve_dockerfile(temp_dir.path(), None).unwrap();
        assert_eq!(result, dockerfile_path);
    }

    #[test]
    fn test_resolve_dockerfile_explicit() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("docker")).unwrap();
        let dockerfile_path = temp_dir.path().join("docker/app.dockerfile");
        fs::write(&dockerfile_path, "FROM alpine").unwrap();

        let result = BuildResolver::resolve_dockerfile(
            temp_dir.path(),
            Some(&PathBuf::from("docker/app.dockerfile")),
        )
        .unwrap();
        assert_eq!(result, dockerfile_path);
    }

    #[test]
    fn test_resolve_dockerfile_not_found() {
        let temp_dir = tempdir().unwrap();
        let result = BuildResolver::resolve_dockerfile(temp_dir.path(), None);
        assert!(matches!(result, Err(BuildError::DockerfileNotFound(_))));
    }

    #[test]
    fn test_resolve_context_missing() {
        let result = BuildResolver::resolve_context(std::path::Path::new("/nonexistent/ctx"));
        assert!(matches!(result, Err(BuildError::ContextNotFound(_))));
    }

    #[test]
    fn test_resolve_context_not_a_directory() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, "x").unwrap();

        let result = BuildResolver::resolve_context(&file);
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    fn app_descriptor(path: &std::path::Path) -> ImageDescriptor {
        let mut context = BuildContext::new(path);
        context.rewrite_from = Some("base".to_string());
        context
            .build_args
            .insert("VERSION".to_string(), "1.0".to_string());
        ImageDescriptor::builder("app")
            .context(context)
            .depends_on("base")
            .build()
            .unwrap()
    }

    #[test]
    fn test_prepare_rewrites_from_upstream() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM base\nCOPY . /app\n").unwrap();

        let descriptor = app_descriptor(temp_dir.path());
        let mut upstream = UpstreamImages::new();
        upstream.insert("base".to_string(), BuiltImage::new("sha256:base"));

        let prepared = BuildResolver::prepare(&BuildRequest::new(&descriptor, &upstream)).unwrap();
        assert_eq!(prepared.dockerfile, b"FROM sha256:base\nCOPY . /app\n");
        assert_eq!(prepared.build_args["VERSION"], "1.0");
        assert_eq!(prepared.context_dir, temp_dir.path());
    }

    #[test]
    fn test_prepare_without_upstream_image() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM base\n").unwrap();

        let descriptor = app_descriptor(temp_dir.path());
        let upstream = UpstreamImages::new();

        let result = BuildResolver::prepare(&BuildRequest::new(&descriptor, &upstream));
        assert!(matches!(
            result,
            Err(BuildError::MissingUpstreamImage { .. })
        ));
    }
}
