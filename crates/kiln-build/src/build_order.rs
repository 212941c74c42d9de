//! Build order computation for targets using topological sort
use crate::emitter::ArtifactEmitter;
use crate::error::{BuildError, BuildResult};
use crate::resolver::{classify_reference, normalize_path};
use crate::targets::TargetDescriptor;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A target in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNode {
    /// Target name
    pub name: String,
    /// Targets that must be executed first
    pub dependencies: Vec<String>,
}

impl TargetNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<S: Into<String>>(mut self, dependencies: impl IntoIterator<Item = S>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Explicit dependency graph between targets of one run
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    /// Nodes in insertion order
    nodes: Vec<TargetNode>,
    index: HashMap<String, usize>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a run. Edges are the explicit `depends_on`
    /// entries plus, for every local library reference, the target whose
    /// planned artifact is the referenced file.
    pub fn from_descriptors(
        descriptors: &[TargetDescriptor],
        emitter: &ArtifactEmitter,
    ) -> BuildResult<Self> {
        let mut producers: HashMap<PathBuf, &str> = HashMap::new();
        for descriptor in descriptors {
            for path in emitter.plan(descriptor)?.produced_paths() {
                producers.insert(normalize_path(&path), &descriptor.name);
            }
        }

        let mut graph = Self::new();
        for descriptor in descriptors {
            let mut dependencies = descriptor.depends_on.clone();
            for reference in &descriptor.libraries {
                let classified = classify_reference(&descriptor.name, reference, emitter.naming())?;
                let Some(local) = classified.local() else {
                    continue;
                };
                // The reference itself first; a stale metadata file may name an
                // older physical file
                let producer = producers
                    .get(&normalize_path(Path::new(reference)))
                    .or_else(|| producers.get(&normalize_path(&local.file)));
                match producer {
                    Some(producer) if *producer != descriptor.name => {
                        if !dependencies.iter().any(|d| d.as_str() == *producer) {
                            dependencies.push(producer.to_string());
                        }
                    }
                    Some(_) => {}
                    None => {
                        tracing::debug!(
                            target_name = %descriptor.name,
                            file = %local.file.display(),
                            "no target in this run produces local library"
                        );
                    }
                }
            }
            graph.add_target(TargetNode::new(&descriptor.name).with_dependencies(dependencies))?;
        }

        Ok(graph)
    }

    /// Add a target. Names must be unique.
    pub fn add_target(&mut self, node: TargetNode) -> BuildResult<()> {
        if self.index.contains_key(&node.name) {
            return Err(BuildError::configuration(
                &node.name,
                "target name is not unique within the run",
            ));
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn get_target(&self, name: &str) -> Option<&TargetNode> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that every dependency names a target in the graph
    pub fn validate(&self) -> BuildResult<()> {
        for node in &self.nodes {
            for dep in &node.dependencies {
                if !self.index.contains_key(dep) {
                    return Err(BuildError::TargetNotFound {
                        target: format!("{} (required by {})", dep, node.name),
                    });
                }
            }
        }
        Ok(())
    }

    /// Topological build order. Among targets whose dependencies are
    /// satisfied, the one inserted first goes next, so an already ordered
    /// input comes back unchanged.
    pub fn compute_build_order(&self) -> BuildResult<Vec<String>> {
        self.validate()?;

        let mut placed: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            let next = self.nodes.iter().find(|node| {
                !placed.contains(node.name.as_str())
                    && node
                        .dependencies
                        .iter()
                        .all(|d| placed.contains(d.as_str()))
            });

            match next {
                Some(node) => {
                    placed.insert(&node.name);
                    order.push(node.name.clone());
                }
                None => {
                    return Err(BuildError::CircularDependency(self.find_cycle()));
                }
            }
        }

        Ok(order)
    }

    /// Find a cycle in the graph (for error reporting)
    fn find_cycle(&self) -> String {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if let Some(cycle) = self.dfs_find_cycle(&node.name, &mut visited, &mut rec_stack, &mut path) {
                return cycle;
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<String> {
        if rec_stack.contains(name) {
            path.push(name.to_string());
            let start = path.iter().position(|n| n == name).unwrap_or(0);
            return Some(path[start..].join(" -> "));
        }

        if !visited.insert(name.to_string()) {
            return None;
        }
        rec_stack.insert(name.to_string());
        path.push(name.to_string());

        if let Some(node) = self.get_target(name) {
            for dep in &node.dependencies {
                if let Some(cycle) = self.dfs_find_cycle(dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(name);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::ArtifactNaming;
    use crate::targets::TargetKind;

    #[test]
    fn test_empty_graph() {
        let graph = TargetGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.compute_build_order().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_linear_dependency_chain() {
        let mut graph = TargetGraph::new();
        graph.add_target(TargetNode::new("app").with_dependencies(["kio"])).unwrap();
        graph.add_target(TargetNode::new("kio").with_dependencies(["kdecore"])).unwrap();
        graph.add_target(TargetNode::new("kdecore")).unwrap();

        assert_eq!(graph.compute_build_order().unwrap(), vec!["kdecore", "kio", "app"]);
    }

    #[test]
    fn test_order_is_stable_for_independent_targets() {
        let mut graph = TargetGraph::new();
        for name in ["c", "a", "b"] {
            graph.add_target(TargetNode::new(name)).unwrap();
        }
        assert_eq!(graph.compute_build_order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_diamond_dependency() {
        let mut graph = TargetGraph::new();
        graph.add_target(TargetNode::new("a").with_dependencies(["b", "c"])).unwrap();
        graph.add_target(TargetNode::new("b").with_dependencies(["d"])).unwrap();
        graph.add_target(TargetNode::new("c").with_dependencies(["d"])).unwrap();
        graph.add_target(TargetNode::new("d")).unwrap();

        assert_eq!(graph.compute_build_order().unwrap(), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = TargetGraph::new();
        graph.add_target(TargetNode::new("a").with_dependencies(["b"])).unwrap();
        graph.add_target(TargetNode::new("b").with_dependencies(["a"])).unwrap();

        match graph.compute_build_order() {
            Err(BuildError::CircularDependency(cycle)) => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("Expected CircularDependency error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let mut graph = TargetGraph::new();
        graph.add_target(TargetNode::new("a").with_dependencies(["nonexistent"])).unwrap();

        match graph.validate() {
            Err(BuildError::TargetNotFound { target }) => assert!(target.contains("nonexistent")),
            other => panic!("Expected TargetNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut graph = TargetGraph::new();
        graph.add_target(TargetNode::new("a")).unwrap();
        assert!(matches!(
            graph.add_target(TargetNode::new("a")),
            Err(BuildError::Configuration { .. })
        ));
    }

    #[test]
    fn test_local_library_references_become_edges() {
        let emitter = ArtifactEmitter::new("build", ArtifactNaming::default());
        let descriptors = vec![
            TargetDescriptor::new("app", TargetKind::Program)
                .with_sources(["main.c"])
                .with_libraries(["build/lib/libfoo.so", "build/./conv/libutil.a", "m"]),
            TargetDescriptor::new("foo", TargetKind::SharedLibrary)
                .in_directory("lib")
                .with_sources(["foo.c"])
                .with_version("1.0.0"),
            TargetDescriptor::new("util", TargetKind::ConvenienceLibrary)
                .in_directory("conv")
                .with_sources(["util.c"]),
        ];

        let graph = TargetGraph::from_descriptors(&descriptors, &emitter).unwrap();
        assert_eq!(graph.get_target("app").unwrap().dependencies, vec!["foo", "util"]);
        assert_eq!(graph.compute_build_order().unwrap(), vec!["foo", "util", "app"]);
    }

    #[test]
    fn test_stale_metadata_still_orders_producer_first() {
        let dir = tempfile::tempdir().unwrap();
        let stale = crate::emitter::LinkMetadata {
            physical: "libfoo.so.1.0.0".to_string(),
            aliases: vec!["libfoo.so".to_string(), "libfoo.so.1".to_string()],
            soname: "libfoo.so.1".to_string(),
            install_dir: None,
        };
        std::fs::write(dir.path().join("libfoo.la"), stale.render()).unwrap();

        let emitter = ArtifactEmitter::new(dir.path(), ArtifactNaming::default());
        let descriptors = vec![
            TargetDescriptor::new("app", TargetKind::Program)
                .with_sources(["main.c"])
                .with_libraries([format!("{}/libfoo.la", dir.path().display())]),
            TargetDescriptor::new("foo", TargetKind::SharedLibrary)
                .with_sources(["foo.c"])
                .with_version("1.2.3"),
        ];

        let graph = TargetGraph::from_descriptors(&descriptors, &emitter).unwrap();
        assert_eq!(graph.compute_build_order().unwrap(), vec!["foo", "app"]);
    }
}
