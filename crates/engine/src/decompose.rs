// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heuristic task decomposition.
//!
//! Large tickets are classified by domain, split into a small ordered list
//! of subtasks with dependencies, and layered into a DAG the scheduler can
//! run in parallel. The import-graph analyzer refines subtask boundaries
//! from actual file dependencies.

use indexmap::IndexMap;
use pilot_core::{Task, TaskId};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Keywords that mark a ticket as system-scoped.
const SCOPE_KEYWORDS: &[&str] = &[
    "system",
    "architecture",
    "integration",
    "end-to-end",
    "refactor",
    "migration",
    "overhaul",
    "redesign",
];

/// Domains a task can classify into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDomain {
    Frontend,
    Backend,
    Testing,
    Fullstack,
    Docs,
    Infra,
}

impl TaskDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskDomain::Frontend => "frontend",
            TaskDomain::Backend => "backend",
            TaskDomain::Testing => "testing",
            TaskDomain::Fullstack => "fullstack",
            TaskDomain::Docs => "docs",
            TaskDomain::Infra => "infra",
        }
    }
}

/// Classification result.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainInfo {
    pub domain: TaskDomain,
    /// Capabilities an assignee must provide.
    pub requires: Vec<String>,
    /// Roles that should follow up after the main work (e.g. testing).
    pub post_agents: Vec<String>,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
}

/// One generated subtask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskSpec {
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    /// Indices into the subtask list this one depends on.
    pub dependencies: Vec<usize>,
}

/// Layered dependency DAG: each layer may run in parallel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDag {
    pub layers: Vec<Vec<usize>>,
}

/// Outcome of a full decomposition pass.
#[derive(Debug, Clone)]
pub struct DecompositionOutcome {
    pub decomposed: bool,
    pub reason: String,
    pub domain: Option<DomainInfo>,
    pub subtasks: Vec<SubtaskSpec>,
    pub dag: TaskDag,
}

/// Whether a task is large enough to split, and why.
pub fn should_decompose(task: &Task) -> (bool, String) {
    let text = format!("{} {}", task.title, task.description).to_ascii_lowercase();
    let scope_hit = SCOPE_KEYWORDS.iter().find(|k| text.contains(*k));

    if let Some(keyword) = scope_hit {
        if task.description.len() > 100 {
            return (
                true,
                format!("system-scope keyword '{keyword}' with substantial description"),
            );
        }
    }
    if text.len() > 300 {
        return (true, "combined text exceeds 300 chars".to_string());
    }

    let domains = ["frontend", "backend", "testing", "docs", "infra"];
    let labeled: Vec<&str> = domains
        .iter()
        .copied()
        .filter(|d| task.has_label(d))
        .collect();
    if labeled.len() > 1 {
        return (true, format!("multi-domain labels: {}", labeled.join("+")));
    }

    (false, "single-domain, small scope".to_string())
}

/// Classify a task's domain from labels, then title/description keywords.
pub fn classify_task_domain(task: &Task) -> DomainInfo {
    let text = format!("{} {}", task.title, task.description).to_ascii_lowercase();

    let frontend = task.has_label("frontend")
        || ["ui", "component", "css", "page", "form"].iter().any(|k| text.contains(k));
    let backend = task.has_label("backend")
        || ["api", "endpoint", "database", "service", "server"].iter().any(|k| text.contains(k));
    let testing = task.has_label("testing")
        || ["test", "coverage", "e2e"].iter().any(|k| text.contains(k));
    let docs = task.has_label("docs") || text.contains("document");
    let infra = task.has_label("infra")
        || ["deploy", "docker", "ci ", "pipeline"].iter().any(|k| text.contains(k));

    let labeled = task.labels.iter().any(|l| {
        ["frontend", "backend", "testing", "docs", "infra"]
            .iter()
            .any(|d| l.eq_ignore_ascii_case(d))
    });
    let confidence = if labeled { 0.9 } else { 0.6 };

    let (domain, requires) = if frontend && backend {
        (
            TaskDomain::Fullstack,
            vec!["ui".to_string(), "api".to_string()],
        )
    } else if frontend {
        (TaskDomain::Frontend, vec!["ui".to_string()])
    } else if backend {
        (TaskDomain::Backend, vec!["api".to_string()])
    } else if testing {
        (TaskDomain::Testing, vec!["unit-tests".to_string()])
    } else if docs {
        (TaskDomain::Docs, vec![])
    } else if infra {
        (TaskDomain::Infra, vec!["ci".to_string()])
    } else {
        (TaskDomain::Backend, vec![])
    };

    let post_agents = if matches!(domain, TaskDomain::Docs) {
        vec![]
    } else {
        vec!["testing".to_string(), "review".to_string()]
    };

    DomainInfo {
        domain,
        requires,
        post_agents,
        confidence,
    }
}

/// Generate an ordered subtask list for a classified task.
pub fn generate_subtasks(task: &Task, domain: &DomainInfo) -> Vec<SubtaskSpec> {
    let mut subtasks = Vec::new();
    let title = &task.title;

    match domain.domain {
        TaskDomain::Fullstack => {
            subtasks.push(SubtaskSpec {
                title: format!("{title}: backend contract"),
                description: "Define and implement the API surface.".to_string(),
                labels: vec!["backend".to_string()],
                dependencies: vec![],
            });
            subtasks.push(SubtaskSpec {
                title: format!("{title}: frontend"),
                description: "Build the UI against the agreed contract.".to_string(),
                labels: vec!["frontend".to_string()],
                dependencies: vec![0],
            });
            subtasks.push(SubtaskSpec {
                title: format!("{title}: integration tests"),
                description: "Cover the end-to-end flow.".to_string(),
                labels: vec!["testing".to_string()],
                dependencies: vec![0, 1],
            });
        }
        TaskDomain::Frontend | TaskDomain::Backend | TaskDomain::Infra => {
            let label = domain.domain.as_str().to_string();
            subtasks.push(SubtaskSpec {
                title: format!("{title}: implementation"),
                description: task.description.clone(),
                labels: vec![label.clone()],
                dependencies: vec![],
            });
            subtasks.push(SubtaskSpec {
                title: format!("{title}: tests"),
                description: "Test the implementation.".to_string(),
                labels: vec!["testing".to_string()],
                dependencies: vec![0],
            });
        }
        TaskDomain::Testing | TaskDomain::Docs => {
            subtasks.push(SubtaskSpec {
                title: title.clone(),
                description: task.description.clone(),
                labels: vec![domain.domain.as_str().to_string()],
                dependencies: vec![],
            });
        }
    }
    subtasks
}

/// Layer subtasks into topological ranks for parallel scheduling.
///
/// A malformed dependency (cycle or out-of-range index) terminates
/// layering early; the remaining nodes land in a final layer so nothing is
/// silently dropped.
pub fn build_dependency_dag(subtasks: &[SubtaskSpec]) -> TaskDag {
    let n = subtasks.len();
    let mut placed: HashSet<usize> = HashSet::new();
    let mut layers = Vec::new();

    while placed.len() < n {
        let layer: Vec<usize> = (0..n)
            .filter(|i| !placed.contains(i))
            .filter(|i| {
                subtasks[*i]
                    .dependencies
                    .iter()
                    .all(|d| *d >= n || placed.contains(d))
            })
            .collect();
        if layer.is_empty() {
            // Cycle: dump the rest into one layer.
            let rest: Vec<usize> = (0..n).filter(|i| !placed.contains(i)).collect();
            layers.push(rest);
            break;
        }
        for i in &layer {
            placed.insert(*i);
        }
        layers.push(layer);
    }
    TaskDag { layers }
}

/// Parse import/include statements to build a file dependency map.
///
/// Understands JS/TS `import ... from`, `require(...)`, Rust `mod`/`use
/// crate::`, and C-style `#include "..."`. Only relative/workspace-local
/// targets are kept.
pub fn analyze_import_graph(
    files: &[PathBuf],
    project_root: &Path,
) -> HashMap<PathBuf, Vec<String>> {
    // Compiled once per call; the files loop is the hot path.
    let patterns: Vec<Regex> = [
        r#"import\s+.*?from\s+['"](\.[^'"]+)['"]"#,
        r#"require\(\s*['"](\.[^'"]+)['"]\s*\)"#,
        r#"^\s*use\s+crate::([\w:]+)"#,
        r#"^\s*mod\s+(\w+)\s*;"#,
        r##"#include\s+"([^"]+)""##,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();

    let mut graph = HashMap::new();
    for file in files {
        let full = project_root.join(file);
        let Ok(text) = std::fs::read_to_string(&full) else {
            continue;
        };
        let mut deps: Vec<String> = Vec::new();
        for line in text.lines() {
            for pattern in &patterns {
                if let Some(captures) = pattern.captures(line) {
                    if let Some(m) = captures.get(1) {
                        deps.push(m.as_str().to_string());
                    }
                }
            }
        }
        graph.insert(file.clone(), deps);
    }
    graph
}

/// Full decomposition pass for one task.
pub fn decompose_task(task: &Task, project_root: &Path) -> DecompositionOutcome {
    let (decompose, reason) = should_decompose(task);
    if !decompose {
        return DecompositionOutcome {
            decomposed: false,
            reason,
            domain: None,
            subtasks: Vec::new(),
            dag: TaskDag::default(),
        };
    }

    let domain = classify_task_domain(task);
    let mut subtasks = generate_subtasks(task, &domain);

    // Refine boundaries with the import graph when the ticket names files.
    let mentioned: Vec<PathBuf> = mentioned_files(&task.description);
    if !mentioned.is_empty() {
        let graph = analyze_import_graph(&mentioned, project_root);
        let coupled: IndexMap<String, usize> = graph
            .values()
            .flatten()
            .fold(IndexMap::new(), |mut acc, dep| {
                *acc.entry(dep.clone()).or_insert(0) += 1;
                acc
            });
        if let Some(spec) = subtasks.first_mut() {
            let hotspots: Vec<&str> = coupled
                .iter()
                .filter(|(_, count)| **count > 1)
                .map(|(dep, _)| dep.as_str())
                .collect();
            if !hotspots.is_empty() {
                spec.description = format!(
                    "{}\nShared dependencies to keep in one subtask: {}",
                    spec.description,
                    hotspots.join(", ")
                );
            }
        }
    }

    let dag = build_dependency_dag(&subtasks);
    DecompositionOutcome {
        decomposed: true,
        reason,
        domain: Some(domain),
        subtasks,
        dag,
    }
}

/// Paths mentioned in free text (`src/...` tokens with an extension).
fn mentioned_files(text: &str) -> Vec<PathBuf> {
    text.split_whitespace()
        .filter(|w| w.contains('/') && w.contains('.') && !w.starts_with("http"))
        .map(|w| PathBuf::from(w.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-')))
        .collect()
}

/// Build `Task` drafts from subtask specs, wiring dependency ids.
pub fn subtask_drafts(parent: &TaskId, subtasks: &[SubtaskSpec]) -> Vec<Task> {
    subtasks
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let mut task = Task::new(
                TaskId::new(format!("{parent}.{}", i + 1)),
                spec.title.clone(),
            );
            task.description = spec.description.clone();
            task.labels = spec.labels.clone();
            task.dependencies = spec
                .dependencies
                .iter()
                .map(|d| TaskId::new(format!("{parent}.{}", d + 1)))
                .collect();
            task
        })
        .collect()
}

#[cfg(test)]
#[path = "decompose_tests.rs"]
mod tests;
