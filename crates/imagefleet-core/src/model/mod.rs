//! Image descriptors and tag handling.

mod descriptor;
mod tag;

pub use descriptor::{BuildContext, ImageDescriptor, ImageDescriptorBuilder, is_valid_name};
pub use tag::{MAX_TAG_LEN, TagRule, correct_tag_name, split_image_tag, validate_tag_name};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with the remaining tags of an image once one tag fails.
///
/// Either way the image ends up Failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFailurePolicy {
    /// Try every tag independently
    #[default]
    Continue,
    /// Stop at the first failing tag
    Abort,
}

impl FromStr for TagFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(TagFailurePolicy::Continue),
            "abort" => Ok(TagFailurePolicy::Abort),
            other => Err(format!("unknown tag failure policy: {}", other)),
        }
    }
}

impl fmt::Display for TagFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFailurePolicy::Continue => write!(f, "continue"),
            TagFailurePolicy::Abort => write!(f, "abort"),
        }
    }
}
