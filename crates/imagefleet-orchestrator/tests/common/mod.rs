#![allow(dead_code)]

use async_trait::async_trait;
use imagefleet_core::{BuildContext, ImageDescriptor};
use imagefleet_orchestrator::{BuildExecutor, BuildRequest, BuiltImage, CancelHandle, PhaseError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn image(name: &str, deps: &[&str]) -> ImageDescriptor {
    ImageDescriptor::builder(name)
        .depends_on_all(deps.iter().copied())
        .build()
        .unwrap()
}

pub fn tagged_image(name: &str, deps: &[&str], tags: &[&str], push: bool) -> ImageDescriptor {
    ImageDescriptor::builder(name)
        .depends_on_all(deps.iter().copied())
        .tags(tags.iter().copied())
        .push(push)
        .build()
        .unwrap()
}

pub fn rewriting_image(name: &str, parent: &str) -> ImageDescriptor {
    let mut context = BuildContext::new(".");
    context.rewrite_from = Some(parent.to_string());
    ImageDescriptor::builder(name)
        .context(context)
        .depends_on(parent)
        .build()
        .unwrap()
}

/// base, app (depends on base), tools
pub fn base_app_tools() -> Vec<ImageDescriptor> {
    vec![
        image("base", &[]),
        image("app", &["base"]),
        image("tools", &[]),
    ]
}

/// Executor whose behaviour per image is scripted up front and which records
/// every call it receives.
#[derive(Default)]
pub struct ScriptedExecutor {
    fail_builds: HashSet<String>,
    panic_builds: HashSet<String>,
    fail_tags: HashSet<String>,
    fail_pushes: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    cancel_on: Option<(String, CancelHandle)>,

    calls: Mutex<Vec<String>>,
    upstream_seen: Mutex<HashMap<String, Option<String>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build(mut self, name: &str) -> Self {
        self.fail_builds.insert(name.to_string());
        self
    }

    pub fn panic_on_build(mut self, name: &str) -> Self {
        self.panic_builds.insert(name.to_string());
        self
    }

    pub fn fail_tag(mut self, reference: &str) -> Self {
        self.fail_tags.insert(reference.to_string());
        self
    }

    pub fn fail_push(mut self, reference: &str) -> Self {
        self.fail_pushes.insert(reference.to_string());
        self
    }

    pub fn delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Cancel the run while `name` is being built.
    pub fn cancel_during(mut self, name: &str, handle: CancelHandle) -> Self {
        self.cancel_on = Some((name.to_string(), handle));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn builds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("build ").map(str::to_string))
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Image id the executor saw as the `FROM` replacement for `name`.
    pub fn rewrite_source(&self, name: &str) -> Option<String> {
        self.upstream_seen.lock().unwrap().get(name).cloned().flatten()
    }
}

#[async_trait]
impl BuildExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn build(&self, request: &BuildRequest<'_>) -> Result<BuiltImage, PhaseError> {
        let name = request.descriptor.name().to_string();
        self.calls.lock().unwrap().push(format!("build {}", name));
        self.upstream_seen.lock().unwrap().insert(
            name.clone(),
            request.rewrite_from_image().map(|image| image.id.clone()),
        );

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some((target, handle)) = &self.cancel_on
            && *target == name
        {
            handle.cancel();
        }

        let delay = self.delays.get(&name).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panic_builds.contains(&name) {
            panic!("scripted panic while building {}", name);
        }
        if self.fail_builds.contains(&name) {
            return Err(PhaseError::new(format!("{} failed to build", name)));
        }
        Ok(BuiltImage::new(format!("sha256:{}", name)))
    }

    async fn tag(&self, _image: &BuiltImage, reference: &str) -> Result<(), PhaseError> {
        self.calls.lock().unwrap().push(format!("tag {}", reference));
        if self.fail_tags.contains(reference) {
            return Err(PhaseError::new("tag rejected"));
        }
        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<(), PhaseError> {
        self.calls.lock().unwrap().push(format!("push {}", reference));
        if self.fail_pushes.contains(reference) {
            return Err(PhaseError::new("unauthorized"));
        }
        Ok(())
    }
}
