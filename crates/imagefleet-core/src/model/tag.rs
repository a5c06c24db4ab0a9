use crate::error::CoreError;
use crate::template::TemplateArgs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum tag length accepted by registries.
pub const MAX_TAG_LEN: usize = 128;

/// Split an image reference into repository and tag.
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // `localhost:5000/app` has a registry port, not a tag
        if !potential_tag.contains('/') {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}

/// Whether `tag` satisfies the registry tag grammar
/// `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn validate_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    tag.len() <= MAX_TAG_LEN
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Turn an arbitrary string (branch names, describe output, ...) into a
/// valid tag: disallowed characters and a leading `.`/`-` become `_`, and the
/// result is cut to [`MAX_TAG_LEN`].
pub fn correct_tag_name(tag: &str) -> String {
    tag.chars()
        .enumerate()
        .map(|(i, c)| {
            let allowed = c.is_ascii_alphanumeric() || c == '_' || (i > 0 && matches!(c, '.' | '-'));
            if allowed { c } else { '_' }
        })
        .take(MAX_TAG_LEN)
        .collect()
}

/// Condition deciding whether a tag applies to the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TagRule {
    #[default]
    Always,
    /// Only when HEAD carries a git tag
    OnTag,
    /// Only when building the named branch
    OnBranch(String),
}

impl TagRule {
    pub fn matches(&self, args: &TemplateArgs) -> bool {
        match self {
            TagRule::Always => true,
            TagRule::OnTag => args.get("git_tag").is_some_and(|t| !t.is_empty()),
            TagRule::OnBranch(branch) => args.get("git_branch") == Some(branch),
        }
    }
}

impl FromStr for TagRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "always" => Ok(TagRule::Always),
            "on_tag" => Ok(TagRule::OnTag),
            other => match other.strip_prefix("on_branch:") {
                Some(branch) if !branch.trim().is_empty() => {
                    Ok(TagRule::OnBranch(branch.trim().to_string()))
                }
                _ => Err(CoreError::InvalidTagRule(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for TagRule {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TagRule> for String {
    fn from(rule: TagRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for TagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagRule::Always => write!(f, "always"),
            TagRule::OnTag => write!(f, "on_tag"),
            TagRule::OnBranch(branch) => write!(f, "on_branch:{}", branch),
        }
    }
}
