//! Dependency ordering across stacks.
//!
//! Two things create edges between stacks: a project's declared
//! `dependencies`, and a backend's `backend_xstack` (the stack that
//! provisions the backend itself, which every stack stored in that backend
//! implicitly builds on). Bare project references inherit the stack name of
//! the stack being ordered, so one declaration covers dev and prod alike.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use xpulumi_core::{Error, Result};

use crate::context::Context;
use crate::project::{list_project_names, Project};

/// A `<project>:<stack>` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackRef {
    pub project: String,
    pub stack: String,
}

impl StackRef {
    #[must_use]
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
        }
    }

    /// Parse `<project>` or `<project>:<stack>`, the bare form taking the
    /// given stack name.
    pub fn parse(text: &str, default_stack: &str) -> Result<Self> {
        let mut parts = text.split(':');
        let project = parts.next().unwrap_or_default();
        let stack = parts.next();
        if project.is_empty() || stack == Some("") || parts.next().is_some() {
            return Err(Error::configuration(format!(
                "invalid stack reference '{text}'; expected '<project>' or '<project>:<stack>'"
            )));
        }
        Ok(Self::new(project, stack.unwrap_or(default_stack)))
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.stack)
    }
}

/// Dependency declarations of one project, detached from the loaded
/// [`Project`] so the graph walk stays synchronous.
struct ProjectDeps {
    dependencies: Vec<String>,
    backend_xstack: Option<String>,
}

async fn load_project_deps(ctx: &Arc<Context>) -> Result<HashMap<String, ProjectDeps>> {
    let mut infos = HashMap::new();
    for name in list_project_names(ctx.config()).await? {
        let project = Project::load(ctx.clone(), Some(&name)).await?;
        infos.insert(
            name,
            ProjectDeps {
                dependencies: project.dependencies().to_vec(),
                backend_xstack: project.backend().backend_xstack().map(str::to_string),
            },
        );
    }
    Ok(infos)
}

fn deps_of(infos: &HashMap<String, ProjectDeps>, target: &StackRef) -> Result<Vec<StackRef>> {
    let info = infos.get(&target.project).ok_or_else(|| {
        Error::project(&target.project, "project is not defined in this environment")
    })?;
    let mut out = Vec::new();
    if let Some(xstack) = &info.backend_xstack {
        let dep = StackRef::parse(xstack, &target.stack)?;
        // A backend's own bootstrap stack references itself; not an edge.
        if dep != *target {
            out.push(dep);
        }
    }
    for declared in &info.dependencies {
        let dep = StackRef::parse(declared, &target.stack)?;
        if dep != *target && !out.contains(&dep) {
            out.push(dep);
        }
    }
    Ok(out)
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    Visiting,
    Done,
}

fn cycle_error(path: &[StackRef], node: &StackRef) -> Error {
    let chain = path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    Error::configuration(format!("circular stack dependency: {chain} -> {node}"))
}

fn visit_deps(
    infos: &HashMap<String, ProjectDeps>,
    node: &StackRef,
    state: &mut HashMap<StackRef, Visit>,
    path: &mut Vec<StackRef>,
    order: &mut Vec<StackRef>,
) -> Result<()> {
    match state.get(node) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::Visiting) => return Err(cycle_error(path, node)),
        None => {}
    }
    state.insert(node.clone(), Visit::Visiting);
    path.push(node.clone());
    for dep in deps_of(infos, node)? {
        visit_deps(infos, &dep, state, path, order)?;
    }
    path.pop();
    state.insert(node.clone(), Visit::Done);
    order.push(node.clone());
    Ok(())
}

fn dependents_of(
    infos: &HashMap<String, ProjectDeps>,
    target: &StackRef,
) -> Result<Vec<StackRef>> {
    let mut names: Vec<&String> = infos.keys().collect();
    names.sort();
    let mut out = Vec::new();
    for name in names {
        let candidate = StackRef::new(name.clone(), target.stack.clone());
        if candidate == *target {
            continue;
        }
        if deps_of(infos, &candidate)?.contains(target) {
            out.push(candidate);
        }
    }
    Ok(out)
}

fn visit_dependents(
    infos: &HashMap<String, ProjectDeps>,
    node: &StackRef,
    state: &mut HashMap<StackRef, Visit>,
    path: &mut Vec<StackRef>,
    order: &mut Vec<StackRef>,
) -> Result<()> {
    match state.get(node) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::Visiting) => return Err(cycle_error(path, node)),
        None => {}
    }
    state.insert(node.clone(), Visit::Visiting);
    path.push(node.clone());
    for dependent in dependents_of(infos, node)? {
        visit_dependents(infos, &dependent, state, path, order)?;
    }
    path.pop();
    state.insert(node.clone(), Visit::Done);
    order.push(node.clone());
    Ok(())
}

/// Stacks to bring up, dependencies first, ending with the target itself.
pub async fn stack_build_order(
    ctx: &Arc<Context>,
    project: &str,
    stack: &str,
) -> Result<Vec<StackRef>> {
    let infos = load_project_deps(ctx).await?;
    let target = StackRef::new(project, stack);
    let mut order = Vec::new();
    visit_deps(
        &infos,
        &target,
        &mut HashMap::new(),
        &mut Vec::new(),
        &mut order,
    )?;
    Ok(order)
}

/// Stacks to tear down before the target can go: dependents first (assuming
/// dependents share the stack name), ending with the target itself.
pub async fn stack_destroy_order(
    ctx: &Arc<Context>,
    project: &str,
    stack: &str,
) -> Result<Vec<StackRef>> {
    let infos = load_project_deps(ctx).await?;
    let target = StackRef::new(project, stack);
    if !infos.contains_key(project) {
        return Err(Error::project(
            project,
            "project is not defined in this environment",
        ));
    }
    let mut order = Vec::new();
    visit_dependents(
        &infos,
        &target,
        &mut HashMap::new(),
        &mut Vec::new(),
        &mut order,
    )?;
    Ok(order)
}
