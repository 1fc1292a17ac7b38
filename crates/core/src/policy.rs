use thiserror::Error;

use crate::types::{Membership, Role};

/// Actions on a group that require authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    Invite,
    ListInvitations,
}

impl GroupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::ListInvitations => "list_invitations",
        }
    }
}

/// Decides whether a user may act on a group based on their membership.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupPolicy;

impl GroupPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Authorizes `action` for the holder of `membership` (if any).
    ///
    /// Every group action currently requires the admin role.
    pub fn authorize(
        &self,
        membership: Option<&Membership>,
        action: GroupAction,
    ) -> Result<(), PolicyError> {
        let Some(membership) = membership else {
            return Err(PolicyError::NotMember);
        };

        match membership.role {
            Role::Admin => Ok(()),
            Role::Member => Err(PolicyError::InsufficientRole { action }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("user is not a member of the group")]
    NotMember,
    #[error("membership role does not allow {}", action.as_str())]
    InsufficientRole { action: GroupAction },
}
