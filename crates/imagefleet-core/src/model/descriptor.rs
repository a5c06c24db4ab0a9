use crate::error::{CoreError, Result};
use crate::model::tag::{split_image_tag, validate_tag_name};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Build input for one image.
///
/// The orchestrator never looks inside; only executors interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildContext {
    /// Context directory
    pub path: PathBuf,
    /// Dockerfile path relative to `path` (default: `Dockerfile`)
    pub dockerfile: Option<PathBuf>,
    /// Build arguments, already template-expanded
    pub build_args: BTreeMap<String, String>,
    /// Image labels, already template-expanded
    pub labels: BTreeMap<String, String>,
    /// Dependency whose built image replaces the first `FROM` image
    pub rewrite_from: Option<String>,
    /// Glob patterns excluded from the context archive
    pub ignore: Vec<String>,
}

impl BuildContext {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dockerfile: None,
            build_args: BTreeMap::new(),
            labels: BTreeMap::new(),
            rewrite_from: None,
            ignore: Vec::new(),
        }
    }

    /// Dockerfile path, resolved against the context directory
    pub fn dockerfile_path(&self) -> PathBuf {
        match &self.dockerfile {
            Some(dockerfile) => self.path.join(dockerfile),
            None => self.path.join("Dockerfile"),
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Immutable description of one image to build, tag and push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    name: String,
    context: BuildContext,
    depends_on: Vec<String>,
    tags: Vec<String>,
    push: bool,
}

impl ImageDescriptor {
    pub fn builder(name: impl Into<String>) -> ImageDescriptorBuilder {
        ImageDescriptorBuilder {
            name: name.into(),
            context: BuildContext::default(),
            depends_on: Vec::new(),
            tags: Vec::new(),
            push: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn push(&self) -> bool {
        self.push
    }

    /// Same image with pushing turned off (`--no-push`).
    pub fn without_push(mut self) -> Self {
        self.push = false;
        self
    }
}

/// Builder for [`ImageDescriptor`]; `build` validates the result.
#[derive(Debug, Clone)]
pub struct ImageDescriptorBuilder {
    name: String,
    context: BuildContext,
    depends_on: Vec<String>,
    tags: Vec<String>,
    push: bool,
}

impl ImageDescriptorBuilder {
    pub fn context(mut self, context: BuildContext) -> Self {
        self.context = context;
        self
    }

    pub fn context_path(mut self, path: impl AsRef<Path>) -> Self {
        self.context.path = path.as_ref().to_path_buf();
        self
    }

    /// Adds a dependency; repeated names are kept once.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.depends_on.contains(&name) {
            self.depends_on.push(name);
        }
        self
    }

    pub fn depends_on_all<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |builder, name| builder.depends_on(name))
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tags.into_iter().fold(self, |builder, tag| builder.tag(tag))
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn build(self) -> Result<ImageDescriptor> {
        if !is_valid_name(&self.name) {
            return Err(CoreError::InvalidName(self.name));
        }

        if let Some(parent) = &self.context.rewrite_from
            && !self.depends_on.contains(parent)
        {
            return Err(CoreError::InvalidDescriptor {
                image: self.name,
                message: format!("rewrite_from '{}' must also be listed in depends_on", parent),
            });
        }

        for tag in &self.tags {
            let (repo, tag_name) = split_image_tag(tag);
            if repo.is_empty() || !validate_tag_name(&tag_name) {
                return Err(CoreError::InvalidDescriptor {
                    image: self.name,
                    message: format!("invalid tag reference '{}'", tag),
                });
            }
        }

        if self.push && self.tags.is_empty() {
            tracing::warn!(image = %self.name, "push requested but no tags are configured");
        }

        Ok(ImageDescriptor {
            name: self.name,
            context: self.context,
            depends_on: self.depends_on,
            tags: self.tags,
            push: self.push,
        })
    }
}

/// ASCII letters, digits, `-`, `_` and `.` only
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
