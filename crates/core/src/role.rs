// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent roles and their capability sets.

use serde::{Deserialize, Serialize};

/// Role assigned to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Frontend,
    Backend,
    Testing,
    Security,
    Pm,
    Design,
    Review,
    Infra,
}

/// A capability a task can require and a role can provide.
///
/// Capabilities are open-ended strings on the task side; the closed set
/// below is what the built-in roles advertise.
pub type Capability = &'static str;

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Frontend,
        Role::Backend,
        Role::Testing,
        Role::Security,
        Role::Pm,
        Role::Design,
        Role::Review,
        Role::Infra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Frontend => "frontend",
            Role::Backend => "backend",
            Role::Testing => "testing",
            Role::Security => "security",
            Role::Pm => "pm",
            Role::Design => "design",
            Role::Review => "review",
            Role::Infra => "infra",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frontend" => Some(Role::Frontend),
            "backend" => Some(Role::Backend),
            "testing" => Some(Role::Testing),
            "security" => Some(Role::Security),
            "pm" => Some(Role::Pm),
            "design" => Some(Role::Design),
            "review" => Some(Role::Review),
            "infra" => Some(Role::Infra),
            _ => None,
        }
    }

    /// Capabilities this role advertises to the scheduler.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Frontend => &["ui", "components", "css", "accessibility"],
            Role::Backend => &["api", "database", "services", "performance"],
            Role::Testing => &["unit-tests", "integration-tests", "e2e", "coverage"],
            Role::Security => &["audit", "auth", "secrets", "hardening"],
            Role::Pm => &["planning", "decomposition", "coordination"],
            Role::Design => &["ux", "wireframes", "design-system"],
            Role::Review => &["code-review", "style", "architecture"],
            Role::Infra => &["ci", "deploy", "docker", "observability"],
        }
    }

    /// Resolve a capability to the first role that provides it.
    pub fn for_capability(capability: &str) -> Option<Role> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.capabilities().contains(&capability))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
