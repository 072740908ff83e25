//! Role model and the authorization decision point.
//!
//! Roles are a closed set rather than free-form strings; every privileged
//! operation funnels through [`authorize`] instead of scattering role
//! checks across handlers.

use serde::{Deserialize, Serialize};

/// Platform roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "GROUP_ADMIN")]
    GroupAdmin,
    #[serde(rename = "SUPER_ADMIN")]
    SuperAdmin,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "GROUP_ADMIN" => Some(Self::GroupAdmin),
            "SUPER_ADMIN" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::GroupAdmin => "GROUP_ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::GroupAdmin | Self::SuperAdmin)
    }
}

/// Privileged action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BanUser,
    PromoteUser,
    ApproveRequest,
    CreateGroup,
    ManageGroup,
    CreateChannel,
    DeleteChannel,
}

/// The single authorization predicate.
///
/// `in_scope_group` is whether the acting user is a member of the group the
/// action targets: a group admin's authority does not extend to groups they
/// do not belong to. Super admins always pass; promotion is super-admin only.
pub fn authorize(action: Action, role: Role, in_scope_group: bool) -> bool {
    if role == Role::SuperAdmin {
        return true;
    }
    match action {
        Action::PromoteUser => false,
        Action::CreateGroup => true,
        Action::BanUser
        | Action::ApproveRequest
        | Action::ManageGroup
        | Action::CreateChannel
        | Action::DeleteChannel => role == Role::GroupAdmin && in_scope_group,
    }
}
