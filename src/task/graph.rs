// src/task/graph.rs

//! Resolved container graph for one task.

use std::collections::BTreeMap;

use crate::errors::{Result, TaskdockError};
use crate::task::{Container, ContainerName};

/// The main container of a task plus the transitive closure of its
/// dependencies, indexed by name.
///
/// Acyclicity and reference validity are enforced during config validation;
/// here we only keep the adjacency information the rules engine needs.
/// Containers refer to their dependencies by name through this index, never
/// through back-pointers, and iteration order (name order) is deterministic
/// so that rule evaluation is reproducible.
#[derive(Debug, Clone)]
pub struct ContainerGraph {
    task_name: String,
    main_container: ContainerName,
    nodes: BTreeMap<ContainerName, Container>,
}

impl ContainerGraph {
    /// Build the graph for a task by walking the dependency closure from the
    /// main container.
    ///
    /// `all_containers` is the full set of containers declared in the config
    /// file; containers not reachable from `main_container` are not part of
    /// this task and are left out.
    pub fn resolve(
        task_name: impl Into<String>,
        main_container: impl Into<ContainerName>,
        all_containers: &BTreeMap<ContainerName, Container>,
    ) -> Result<Self> {
        let task_name = task_name.into();
        let main_container = main_container.into();

        let mut nodes = BTreeMap::new();
        let mut stack = vec![main_container.clone()];

        while let Some(name) = stack.pop() {
            if nodes.contains_key(&name) {
                continue;
            }

            let container = all_containers
                .get(&name)
                .ok_or_else(|| TaskdockError::ContainerNotFound(name.clone()))?;

            stack.extend(container.dependencies.iter().cloned());
            nodes.insert(name, container.clone());
        }

        Ok(Self {
            task_name,
            main_container,
            nodes,
        })
    }

    /// Build a graph directly from a set of containers (used by tests and
    /// builders, bypassing the config layer).
    pub fn from_containers(
        task_name: impl Into<String>,
        main_container: impl Into<ContainerName>,
        containers: Vec<Container>,
    ) -> Result<Self> {
        let all = containers
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect::<BTreeMap<_, _>>();

        Self::resolve(task_name, main_container, &all)
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn main_container_name(&self) -> &ContainerName {
        &self.main_container
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.nodes.get(name)
    }

    /// All containers in the task, in deterministic (name) order.
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.nodes.values()
    }

    /// Direct dependencies of a container.
    pub fn dependencies_of(&self, name: &str) -> &[ContainerName] {
        self.nodes
            .get(name)
            .map(|c| c.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_health_check(&self, name: &str) -> bool {
        self.nodes
            .get(name)
            .map(|c| c.has_health_check())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_includes_only_the_reachable_closure() {
        let mut all = BTreeMap::new();

        let mut app = Container::from_image("app", "app:latest");
        app.dependencies = vec!["db".to_string()];
        all.insert("app".to_string(), app);
        all.insert(
            "db".to_string(),
            Container::from_image("db", "postgres:13"),
        );
        all.insert(
            "unrelated".to_string(),
            Container::from_image("unrelated", "redis:7"),
        );

        let graph = ContainerGraph::resolve("build", "app", &all).unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph.container("app").is_some());
        assert!(graph.container("db").is_some());
        assert!(graph.container("unrelated").is_none());
    }

    #[test]
    fn resolve_fails_on_unknown_dependency() {
        let mut all = BTreeMap::new();
        let mut app = Container::from_image("app", "app:latest");
        app.dependencies = vec!["missing".to_string()];
        all.insert("app".to_string(), app);

        let result = ContainerGraph::resolve("build", "app", &all);

        assert!(matches!(result, Err(TaskdockError::ContainerNotFound(name)) if name == "missing"));
    }
}
