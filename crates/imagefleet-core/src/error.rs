use thiserror::Error;

/// Errors raised while building the dependency graph.
///
/// All of these are fatal: a run never starts once one is detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate image name: {0}")]
    DuplicateName(String),

    #[error("image '{image}' depends on unknown image '{dependency}'")]
    UnknownDependency { image: String, dependency: String },

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("unknown build target: {0}")]
    UnknownTarget(String),
}

/// Errors raised while turning manifest entries into image descriptors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid image name '{0}': use ASCII letters, digits, '-', '_' or '.'")]
    InvalidName(String),

    #[error("invalid image '{image}': {message}")]
    InvalidDescriptor { image: String, message: String },

    #[error("invalid tag rule '{0}': expected always, on_tag or on_branch:<name>")]
    InvalidTagRule(String),

    #[error("template argument '{{{0}}}' has no value")]
    MissingTemplateArg(String),

    #[error("malformed template: {0}")]
    InvalidTemplate(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
