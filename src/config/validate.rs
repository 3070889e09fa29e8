// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskdockError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskdockError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.project_name,
            raw.task,
            raw.container,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_tasks(cfg)?;
    validate_containers(cfg)?;
    validate_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskdockError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if !cfg.container.contains_key(&task.container) {
            return Err(TaskdockError::ConfigError(format!(
                "task '{}' refers to unknown container '{}'",
                name, task.container
            )));
        }

        for prerequisite in task.prerequisites.iter() {
            if !cfg.task.contains_key(prerequisite) {
                return Err(TaskdockError::ConfigError(format!(
                    "task '{}' has unknown prerequisite task '{}'",
                    name, prerequisite
                )));
            }
            if prerequisite == name {
                return Err(TaskdockError::ConfigError(format!(
                    "task '{}' cannot be its own prerequisite",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_containers(cfg: &RawConfigFile) -> Result<()> {
    // Running the domain conversion checks image-source exclusivity, volume
    // and port syntax, port ranges and health-check durations.
    for (name, container) in cfg.container.iter() {
        container.to_container(name)?;
    }
    Ok(())
}

fn validate_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            if !cfg.container.contains_key(dep) {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{}' has unknown dependency '{}'",
                    name, dep
                )));
            }
            if dep == name {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{}' cannot depend on itself",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> container. A topological sort fails iff there
    // is a cycle.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.container.keys() {
        graph.add_node(name.as_str());
    }

    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TaskdockError::DependencyCycle(format!(
                "cycle detected in container dependencies involving '{}'",
                node
            )))
        }
    }
}
