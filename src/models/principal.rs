//! Resolved request principal

use serde::Serialize;

/// The two classes of caller the guard chain understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Member,
    Guest,
}

/// Identity resolved for a single request. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
    pub is_global_admin: bool,
    pub is_disabled: bool,
    pub email: Option<String>,
}

impl Principal {
    /// Member principal with the privilege flags read from the user store
    pub fn member(
        id: impl Into<String>,
        email: Option<String>,
        is_global_admin: bool,
        is_disabled: bool,
    ) -> Self {
        Self {
            id: id.into(),
            kind: PrincipalKind::Member,
            is_global_admin,
            is_disabled,
            email,
        }
    }

    /// One-off guest principal with a fresh id
    pub fn guest() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: PrincipalKind::Guest,
            is_global_admin: false,
            is_disabled: false,
            email: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.kind == PrincipalKind::Guest
    }
}
