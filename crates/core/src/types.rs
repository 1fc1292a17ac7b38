use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A purchasing group that owns memberships and invitations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An email invitation into a group, redeemable through its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: i64,
    pub group_id: i64,
    pub invited_by_id: i64,
    pub email: String,
    pub token: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invitation {
    pub fn status(&self) -> InvitationStatus {
        if self.accepted {
            InvitationStatus::Accepted
        } else {
            InvitationStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == InvitationStatus::Pending
    }
}

/// Lifecycle of an invitation. Transitions only from `Pending` to `Accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
}

/// Role held by a user inside a group, persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    /// Returns the integer stored in `memberships.role`.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Member => 0,
            Self::Admin => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Member),
            1 => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A user's membership of a group. At most one exists per (user, group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registered account including the password digest. Never serialized directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The externally visible projection of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn timestamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn role_round_trips_through_storage_integer() {
        assert_eq!(Role::from_i64(Role::Admin.as_i64()), Some(Role::Admin));
        assert_eq!(Role::from_i64(Role::Member.as_i64()), Some(Role::Member));
        assert_eq!(Role::from_i64(7), None);
    }

    #[test]
    fn invitation_status_follows_accepted_flag() {
        let mut invitation = Invitation {
            id: 1,
            group_id: 1,
            invited_by_id: 1,
            email: "a@x.com".into(),
            token: "token".into(),
            sent_at: None,
            accepted: false,
            created_at: timestamp(),
            updated_at: timestamp(),
        };
        assert!(invitation.is_pending());

        invitation.accepted = true;
        assert_eq!(invitation.status(), InvitationStatus::Accepted);
    }

    #[test]
    fn public_user_omits_password_digest() {
        let user = User {
            id: 3,
            email: "a@x.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            username: "ada".into(),
            password_digest: "$argon2id$secret".into(),
            created_at: timestamp(),
            updated_at: timestamp(),
        };

        let value = serde_json::to_value(PublicUser::from(user)).expect("serialize");
        assert_eq!(value["username"], json!("ada"));
        assert!(value.get("password_digest").is_none());
        assert!(!value.to_string().contains("argon2"));
    }
}
