//! Raw manifest model and its conversion into image descriptors.
//!
//! The manifest is materialized by a config loader; this module only cares
//! about the data, not the file syntax.

use crate::error::{CoreError, Result};
use crate::model::{
    BuildContext, ImageDescriptor, TagFailurePolicy, TagRule, correct_tag_name, split_image_tag,
    validate_tag_name,
};
use crate::template::{self, ArgGenerator, CommandGenerator, DateGenerator, TemplateArgs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Whole manifest: run settings, extra template arguments and images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub template_args: Vec<ExtraArgSpec>,

    #[serde(default)]
    pub images: Vec<ImageSpec>,
}

/// Run-wide settings; CLI flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub concurrency: Option<usize>,
    pub tag_failure: Option<TagFailurePolicy>,
}

/// Extra template argument declared in the manifest.
///
/// Entries with a missing field or an unknown `type` are skipped with a
/// warning instead of failing the whole manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraArgSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `value` is a shell command; its output becomes the argument
    Cmd,
    /// `value` is a strftime format applied to the current time
    Datetime,
}

impl ArgKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "cmd" => Some(ArgKind::Cmd),
            "datetime" => Some(ArgKind::Datetime),
            _ => None,
        }
    }
}

impl ExtraArgSpec {
    pub fn to_generator(&self) -> Option<Box<dyn ArgGenerator>> {
        let (Some(name), Some(kind), Some(value)) = (&self.name, &self.kind, &self.value) else {
            warn!(entry = ?self, "Ignoring incomplete template argument");
            return None;
        };

        match ArgKind::parse(kind) {
            Some(ArgKind::Cmd) => Some(Box::new(CommandGenerator::new(name, value))),
            Some(ArgKind::Datetime) => Some(Box::new(DateGenerator::with_format(name, value))),
            None => {
                warn!(name = %name, kind = %kind, "Ignoring template argument of unknown type");
                None
            }
        }
    }
}

/// One image entry as written in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
    pub name: String,

    #[serde(default = "default_context")]
    pub context: PathBuf,

    #[serde(default)]
    pub dockerfile: Option<PathBuf>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub rewrite_from: Option<String>,

    #[serde(default)]
    pub tags: Vec<TagSpec>,

    #[serde(default)]
    pub push: bool,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

/// A tag template, optionally guarded by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagSpec {
    Plain(String),
    Rule {
        image: String,
        #[serde(default)]
        when: TagRule,
    },
}

impl TagSpec {
    pub fn template(&self) -> &str {
        match self {
            TagSpec::Plain(image) | TagSpec::Rule { image, .. } => image,
        }
    }

    pub fn rule(&self) -> TagRule {
        match self {
            TagSpec::Plain(_) => TagRule::Always,
            TagSpec::Rule { when, .. } => when.clone(),
        }
    }
}

impl Manifest {
    /// Convert every image entry, running the git/date/command generators
    /// inside `base_dir`.
    pub fn to_descriptors(&self, base_dir: &Path) -> Result<Vec<ImageDescriptor>> {
        let extra = || -> Vec<Box<dyn ArgGenerator>> {
            self.template_args
                .iter()
                .filter_map(ExtraArgSpec::to_generator)
                .collect()
        };
        let tag_args = template::collect_args(&template::tag_generators(extra()), base_dir);
        let label_args = template::collect_args(&template::label_generators(extra()), base_dir);

        self.to_descriptors_with(base_dir, &tag_args, &label_args)
    }

    /// Convert every image entry with already-collected template arguments.
    pub fn to_descriptors_with(
        &self,
        base_dir: &Path,
        tag_args: &TemplateArgs,
        label_args: &TemplateArgs,
    ) -> Result<Vec<ImageDescriptor>> {
        self.images
            .iter()
            .map(|spec| spec.to_descriptor(base_dir, tag_args, label_args))
            .collect()
    }
}

impl ImageSpec {
    pub fn to_descriptor(
        &self,
        base_dir: &Path,
        tag_args: &TemplateArgs,
        label_args: &TemplateArgs,
    ) -> Result<ImageDescriptor> {
        let context = BuildContext {
            path: base_dir.join(&self.context),
            dockerfile: self.dockerfile.clone(),
            build_args: self.expand_map(&self.build_args, tag_args)?,
            labels: self.expand_map(&self.labels, label_args)?,
            rewrite_from: self.rewrite_from.clone(),
            ignore: self.ignore.clone(),
        };

        let mut tags = Vec::with_capacity(self.tags.len());
        for spec in &self.tags {
            if let Some(tag) = resolve_tag(&self.name, spec, tag_args) {
                tags.push(tag);
            }
        }

        ImageDescriptor::builder(&self.name)
            .context(context)
            .depends_on_all(&self.depends_on)
            .tags(tags)
            .push(self.push)
            .build()
    }

    fn expand_map(
        &self,
        map: &BTreeMap<String, String>,
        args: &TemplateArgs,
    ) -> Result<BTreeMap<String, String>> {
        map.iter()
            .map(|(key, value)| {
                let value = template::expand(value, args).map_err(|e| {
                    CoreError::InvalidDescriptor {
                        image: self.name.clone(),
                        message: format!("{}: {}", key, e),
                    }
                })?;
                Ok((key.clone(), value))
            })
            .collect()
    }
}

/// Expand one tag template. Returns `None` when the rule does not match this
/// run or the template needs an argument nobody produced.
fn resolve_tag(image: &str, spec: &TagSpec, args: &TemplateArgs) -> Option<String> {
    let rule = spec.rule();
    if !rule.matches(args) {
        debug!(image, tag = spec.template(), %rule, "Tag rule does not apply");
        return None;
    }

    // split before expanding: values such as branch names may contain '/' or ':'
    let (repo, tag) = split_image_tag(spec.template());
    let expanded = template::expand(&repo, args).and_then(|repo| {
        let tag = template::expand(&tag, args)?;
        Ok((repo, tag))
    });
    let (repo, tag) = match expanded {
        Ok(pair) => pair,
        Err(e) => {
            warn!(image, tag = spec.template(), error = %e, "Dropping tag");
            return None;
        }
    };

    if repo.is_empty() || tag.is_empty() {
        warn!(image, tag = spec.template(), "Dropping tag with an empty repository or tag");
        return None;
    }

    if validate_tag_name(&tag) {
        return Some(format!("{}:{}", repo, tag));
    }

    let corrected = correct_tag_name(&tag);
    warn!(image, from = %tag, to = %corrected, "Corrected invalid tag name");
    Some(format!("{}:{}", repo, corrected))
}
