//! Row-access policies.
//!
//! SQLite has no row-level security, so policies are evaluated by the
//! data-access layer before a statement is issued. A [`PolicySet`] is plain
//! configuration: grants not listed are denied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};
use crate::models::UnknownVariant;

/// Caller identity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unauthenticated caller.
    Public,
    /// Any signed-in user.
    Authenticated,
    /// Trusted backend service.
    ServiceRole,
}

/// Tables covered by policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Properties,
    Leads,
    Conversations,
    Messages,
}

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Public, Role::Authenticated, Role::ServiceRole];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Authenticated => "authenticated",
            Role::ServiceRole => "service_role",
        }
    }
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Users,
        Table::Properties,
        Table::Leads,
        Table::Conversations,
        Table::Messages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Properties => "properties",
            Table::Leads => "leads",
            Table::Conversations => "conversations",
            Table::Messages => "messages",
        }
    }
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Select, Action::Insert, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "Role",
                value: s.to_string(),
            })
    }
}

/// A grant of one action on one table to a set of roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name, for diagnostics.
    pub name: String,
    pub table: Table,
    pub action: Action,
    pub roles: Vec<Role>,
}

/// The set of grants in force.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    /// An empty set; every request is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant.
    pub fn grant(
        mut self,
        name: impl Into<String>,
        table: Table,
        actions: &[Action],
        roles: &[Role],
    ) -> Self {
        let name = name.into();
        for action in actions {
            self.policies.push(Policy {
                name: name.clone(),
                table,
                action: *action,
                roles: roles.to_vec(),
            });
        }
        self
    }

    /// The permissive configuration shipped with the schema.
    ///
    /// Conversations and messages are open to everyone. Properties are
    /// readable by signed-in callers and writable by the service role only.
    /// Users and leads are reserved to the service role.
    ///
    /// This is a placeholder and must be tightened for production.
    pub fn placeholder() -> Self {
        const WRITES: &[Action] = &[Action::Insert, Action::Update, Action::Delete];

        PolicySet::new()
            .grant("allow all on conversations", Table::Conversations, &Action::ALL, &Role::ALL)
            .grant("allow all on messages", Table::Messages, &Action::ALL, &Role::ALL)
            .grant(
                "authenticated read properties",
                Table::Properties,
                &[Action::Select],
                &[Role::Authenticated, Role::ServiceRole],
            )
            .grant("service writes properties", Table::Properties, WRITES, &[Role::ServiceRole])
            .grant("service manages users", Table::Users, &Action::ALL, &[Role::ServiceRole])
            .grant("service manages leads", Table::Leads, &Action::ALL, &[Role::ServiceRole])
    }

    /// Every table reserved to the service role.
    pub fn service_only() -> Self {
        Table::ALL.into_iter().fold(PolicySet::new(), |set, table| {
            set.grant(
                format!("service manages {}", table),
                table,
                &Action::ALL,
                &[Role::ServiceRole],
            )
        })
    }

    /// Whether `role` may perform `action` on `table`.
    pub fn allows(&self, role: Role, table: Table, action: Action) -> bool {
        self.policies
            .iter()
            .any(|p| p.table == table && p.action == action && p.roles.contains(&role))
    }

    /// Like [`PolicySet::allows`], but returns [`DatabaseError::AccessDenied`].
    pub fn check(&self, role: Role, table: Table, action: Action) -> Result<()> {
        if self.allows(role, table, action) {
            return Ok(());
        }
        tracing::warn!(%role, %table, %action, "access denied by policy");
        Err(DatabaseError::AccessDenied { role, table, action })
    }

    /// The grants in force.
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }
}
