//! Domain layer shared by the storage, HTTP and delivery code.
pub mod accept;
pub mod emails;
pub mod messages;
pub mod policy;
pub mod types;

pub use accept::{AcceptInvitationForm, FieldErrors, ValidAccount};
pub use emails::{extract_emails, is_valid_email, MAX_BULK_INVITATIONS};
pub use messages::{Messages, MessageKey};
pub use policy::{GroupAction, GroupPolicy, PolicyError};
pub use types::{Group, Invitation, InvitationStatus, Membership, PublicUser, Role, User};
