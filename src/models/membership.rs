//! Workspace membership model and its status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Role of a member within one workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
}

impl MembershipRole {
    /// OWNER and ADMIN count towards the "at least one admin" invariant
    pub fn is_privileged(&self) -> bool {
        matches!(self, MembershipRole::Owner | MembershipRole::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "OWNER",
            MembershipRole::Admin => "ADMIN",
            MembershipRole::Member => "MEMBER",
        }
    }
}

impl std::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MembershipRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OWNER" => Ok(MembershipRole::Owner),
            "ADMIN" => Ok(MembershipRole::Admin),
            "MEMBER" => Ok(MembershipRole::Member),
            _ => Err(format!("Invalid membership role: {}", s)),
        }
    }
}

/// Membership status. Rows are never hard-deleted; they cycle through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Active,
    Removed,
}

/// Events that move a membership between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    Accept,
    Decline,
    Leave,
    Remove,
    Reinvite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to a {from} membership")]
pub struct InvalidTransition {
    pub from: MembershipStatus,
    pub event: MembershipEvent,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Active => "active",
            MembershipStatus::Removed => "removed",
        }
    }

    /// Apply `event`, returning the next status.
    ///
    /// ```text
    /// pending --accept-->  active
    /// pending --decline--> removed
    /// pending --remove-->  removed   (invite withdrawn)
    /// active  --leave-->   removed
    /// active  --remove-->  removed
    /// removed --reinvite-> pending
    /// ```
    pub fn transition(self, event: MembershipEvent) -> Result<MembershipStatus, InvalidTransition> {
        use MembershipEvent::*;
        use MembershipStatus::*;

        match (self, event) {
            (Pending, Accept) => Ok(Active),
            (Pending, Decline) | (Pending, Remove) => Ok(Removed),
            (Active, Leave) | (Active, Remove) => Ok(Removed),
            (Removed, Reinvite) => Ok(Pending),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Statuses from which `event` is allowed
    pub fn sources_for(event: MembershipEvent) -> &'static [MembershipStatus] {
        match event {
            MembershipEvent::Accept | MembershipEvent::Decline => &[MembershipStatus::Pending],
            MembershipEvent::Leave => &[MembershipStatus::Active],
            MembershipEvent::Remove => &[MembershipStatus::Pending, MembershipStatus::Active],
            MembershipEvent::Reinvite => &[MembershipStatus::Removed],
        }
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MembershipStatus::Pending),
            "active" => Ok(MembershipStatus::Active),
            "removed" => Ok(MembershipStatus::Removed),
            _ => Err(format!("Invalid membership status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub workspace_id: String,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub invited_by: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Active and OWNER/ADMIN
    pub fn is_active_admin(&self) -> bool {
        self.is_active() && self.role.is_privileged()
    }
}

/// Membership joined with the member's user row, for listings
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceMember {
    #[serde(flatten)]
    pub membership: Membership,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InviteMemberRequest {
    #[validate(length(min = 1))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: MembershipRole,
}
