// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Symbolic repository zones and their glob membership.
//!
//! Areas are the unit of coarse mutual exclusion: a path maps to at most
//! one area, and at most one live session may lock a given area.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A symbolic zone of the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Frontend,
    Backend,
    Hooks,
    Config,
    Tests,
    Docs,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Frontend => "frontend",
            Area::Backend => "backend",
            Area::Hooks => "hooks",
            Area::Config => "config",
            Area::Tests => "tests",
            Area::Docs => "docs",
        }
    }

    pub fn parse(s: &str) -> Option<Area> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frontend" => Some(Area::Frontend),
            "backend" => Some(Area::Backend),
            "hooks" => Some(Area::Hooks),
            "config" => Some(Area::Config),
            "tests" => Some(Area::Tests),
            "docs" => Some(Area::Docs),
            _ => None,
        }
    }
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered glob table mapping relative paths to areas. First match wins.
#[derive(Debug, Clone)]
pub struct AreaMap {
    rules: Vec<(Pattern, Area)>,
}

impl Default for AreaMap {
    fn default() -> Self {
        Self::from_rules(&[
            ("src/components/**", Area::Frontend),
            ("src/pages/**", Area::Frontend),
            ("src/styles/**", Area::Frontend),
            ("**/*.tsx", Area::Frontend),
            ("**/*.css", Area::Frontend),
            ("src/api/**", Area::Backend),
            ("src/server/**", Area::Backend),
            ("src/services/**", Area::Backend),
            ("src/db/**", Area::Backend),
            ("hooks/**", Area::Hooks),
            (".claude/hooks/**", Area::Hooks),
            ("**/*.config.*", Area::Config),
            ("config/**", Area::Config),
            (".env*", Area::Config),
            ("tests/**", Area::Tests),
            ("**/*.test.*", Area::Tests),
            ("**/*.spec.*", Area::Tests),
            ("docs/**", Area::Docs),
            ("**/*.md", Area::Docs),
        ])
    }
}

impl AreaMap {
    /// Build a map from `(glob, area)` pairs, skipping invalid globs.
    pub fn from_rules(rules: &[(&str, Area)]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|(pat, area)| Pattern::new(pat).ok().map(|p| (p, *area)))
            .collect();
        Self { rules }
    }

    /// Map a repository-relative path to its area, if any rule matches.
    pub fn area_for(&self, path: &Path) -> Option<Area> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches_path(path))
            .map(|(_, area)| *area)
    }

    /// All paths in `paths` that belong to `area`.
    pub fn paths_in_area<'a>(&self, paths: &'a [&'a Path], area: Area) -> Vec<&'a Path> {
        paths
            .iter()
            .copied()
            .filter(|p| self.area_for(p) == Some(area))
            .collect()
    }
}

#[cfg(test)]
#[path = "area_tests.rs"]
mod tests;
