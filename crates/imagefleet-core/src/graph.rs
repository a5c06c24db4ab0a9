//! Dependency graph over image descriptors.
//!
//! Edges run parent -> child (a child's build context is based on its
//! parents). The graph is validated once on construction and read-only
//! afterwards; transitive descendants are precomputed so failure propagation
//! is a lookup.

use crate::error::GraphError;
use crate::model::ImageDescriptor;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Validated, acyclic graph of images in manifest order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<ImageDescriptor>,
    index: HashMap<String, usize>,
    /// node -> parents
    dependencies: Vec<Vec<usize>>,
    /// node -> children
    dependents: Vec<Vec<usize>>,
    /// node -> all transitive children
    descendants: Vec<BTreeSet<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnPath,
    Done,
}

impl DependencyGraph {
    /// Build and validate the graph.
    ///
    /// Fails on duplicate names, dependencies that name no descriptor, and
    /// cycles (including an image depending on itself).
    pub fn build<I>(descriptors: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = ImageDescriptor>,
    {
        let nodes: Vec<ImageDescriptor> = descriptors.into_iter().collect();

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name().to_string(), i).is_some() {
                return Err(GraphError::DuplicateName(node.name().to_string()));
            }
        }

        let mut dependencies = Vec::with_capacity(nodes.len());
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let mut parents = Vec::with_capacity(node.depends_on().len());
            for dep in node.depends_on() {
                let parent = *index.get(dep).ok_or_else(|| GraphError::UnknownDependency {
                    image: node.name().to_string(),
                    dependency: dep.clone(),
                })?;
                parents.push(parent);
                dependents[parent].push(i);
            }
            dependencies.push(parents);
        }

        let order = topological_order(&nodes, &dependencies)?;

        // children are finished before their parents when walking backwards
        let mut descendants = vec![BTreeSet::new(); nodes.len()];
        for &node in order.iter().rev() {
            let mut closure = BTreeSet::new();
            for &child in &dependents[node] {
                closure.insert(child);
                closure.extend(descendants[child].iter().copied());
            }
            descendants[node] = closure;
        }

        tracing::debug!(images = nodes.len(), "Dependency graph built");

        Ok(Self {
            nodes,
            index,
            dependencies,
            dependents,
            descendants,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ImageDescriptor> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Descriptors in manifest order
    pub fn descriptors(&self) -> impl Iterator<Item = &ImageDescriptor> {
        self.nodes.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name())
    }

    /// Direct parents of `name`
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.lookup(name, &self.dependencies)
    }

    /// Direct children of `name`
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.lookup(name, &self.dependents)
    }

    /// Every image that transitively depends on `name`, in manifest order.
    pub fn descendants(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| {
                self.descendants[i]
                    .iter()
                    .map(|&d| self.nodes[d].name())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Images not in `completed` whose dependencies all are.
    ///
    /// Pure function of `completed`; result is in manifest order.
    pub fn ready_set(&self, completed: &HashSet<String>) -> Vec<&str> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !completed.contains(node.name()))
            .filter(|(i, _)| {
                self.dependencies[*i]
                    .iter()
                    .all(|&p| completed.contains(self.nodes[p].name()))
            })
            .map(|(_, node)| node.name())
            .collect()
    }

    /// Layers of mutually independent images; every image appears in a
    /// later layer than all of its dependencies.
    pub fn topological_layers(&self) -> Vec<Vec<&str>> {
        let mut completed = HashSet::with_capacity(self.nodes.len());
        let mut layers = Vec::new();

        while completed.len() < self.nodes.len() {
            let layer = self.ready_set(&completed);
            if layer.is_empty() {
                break;
            }
            completed.extend(layer.iter().map(|name| name.to_string()));
            layers.push(layer);
        }

        layers
    }

    pub fn topological_order(&self) -> Vec<&str> {
        self.topological_layers().into_iter().flatten().collect()
    }

    /// Restrict the graph to `targets` and everything they depend on.
    pub fn select<S: AsRef<str>>(&self, targets: &[S]) -> Result<Self, GraphError> {
        let mut keep = HashSet::new();
        let mut stack = Vec::with_capacity(targets.len());

        for target in targets {
            let target = target.as_ref();
            let &i = self
                .index
                .get(target)
                .ok_or_else(|| GraphError::UnknownTarget(target.to_string()))?;
            stack.push(i);
        }

        while let Some(i) = stack.pop() {
            if keep.insert(i) {
                stack.extend(self.dependencies[i].iter().copied());
            }
        }

        Self::build(
            self.nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| keep.contains(i))
                .map(|(_, node)| node.clone()),
        )
    }

    fn lookup<'a>(&'a self, name: &str, edges: &[Vec<usize>]) -> Vec<&'a str> {
        self.index
            .get(name)
            .map(|&i| edges[i].iter().map(|&e| self.nodes[e].name()).collect())
            .unwrap_or_default()
    }
}

/// Depth-first post-order over dependency edges (parents before children).
///
/// Tracks the active path so a back edge reports the cycle it closes.
fn topological_order(
    nodes: &[ImageDescriptor],
    dependencies: &[Vec<usize>],
) -> Result<Vec<usize>, GraphError> {
    let mut state = vec![Visit::New; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut path = Vec::new();

    for root in 0..nodes.len() {
        visit(root, dependencies, &mut state, &mut path, &mut order).map_err(|cycle| {
            GraphError::CycleDetected {
                cycle: cycle.iter().map(|&i| nodes[i].name().to_string()).collect(),
            }
        })?;
    }

    Ok(order)
}

fn visit(
    node: usize,
    dependencies: &[Vec<usize>],
    state: &mut [Visit],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match state[node] {
        Visit::Done => return Ok(()),
        Visit::OnPath => {
            let start = path.iter().position(|&p| p == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        Visit::New => {}
    }

    state[node] = Visit::OnPath;
    path.push(node);

    for &parent in &dependencies[node] {
        visit(parent, dependencies, state, path, order)?;
    }

    path.pop();
    state[node] = Visit::Done;
    order.push(node);
    Ok(())
}
