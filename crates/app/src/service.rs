use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use metrics::counter;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{info, warn};

use onboard_core::{
    AcceptInvitationForm, FieldErrors, Group, Invitation, MessageKey, Messages, Role, User,
};
use onboard_storage::{
    Database, InvitationError, MembershipError, NewInvitation, NewMembership, NewUser, UserError,
};

use crate::auth::{hash_password, PasswordError};

const TOKEN_BYTES: usize = 32;
const TOKEN_ATTEMPTS: usize = 3;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type TokenSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Creates invitations in bulk and turns accepted invitations into accounts.
#[derive(Clone)]
pub struct InvitationService {
    database: Database,
    clock: Clock,
    tokens: TokenSource,
}

impl InvitationService {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self {
            database,
            clock,
            tokens: Arc::new(generate_token),
        }
    }

    #[cfg(test)]
    pub fn with_token_source(mut self, tokens: TokenSource) -> Self {
        self.tokens = tokens;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Persists one pending invitation per address, all or nothing.
    ///
    /// Addresses are used as given: duplicates produce separate invitations.
    pub async fn bulk_invite(
        &self,
        group: &Group,
        inviter: &User,
        emails: &[String],
    ) -> Result<Vec<Invitation>, InviteError> {
        let repo = self.database.invitations();
        let created_at = self.now();
        let mut tx = self.database.begin().await?;
        let mut created = Vec::with_capacity(emails.len());

        for email in emails {
            let mut attempt = 0;
            let invitation = loop {
                attempt += 1;
                let token = (self.tokens)();
                let record = NewInvitation {
                    group_id: group.id,
                    invited_by_id: inviter.id,
                    email,
                    token: &token,
                    created_at,
                };
                match repo.insert(&mut tx, &record).await {
                    Ok(invitation) => break invitation,
                    Err(InvitationError::DuplicateToken) if attempt < TOKEN_ATTEMPTS => {
                        warn!(stage = "invite", attempt, "invitation token collided, regenerating");
                    }
                    Err(InvitationError::DuplicateToken) => return Err(InviteError::TokenExhausted),
                    Err(err) => return Err(err.into()),
                }
            };
            created.push(invitation);
        }

        tx.commit().await?;
        counter!("invitations_created_total").increment(created.len() as u64);
        info!(
            stage = "invite",
            group_id = group.id,
            inviter_id = inviter.id,
            count = created.len(),
            "invitations created"
        );
        Ok(created)
    }

    /// Creates the account described by `form` and joins it to the invitation's group.
    ///
    /// Field problems are collected into [`AcceptError::Invalid`]; in that case
    /// nothing is written and the invitation stays pending.
    pub async fn accept(
        &self,
        invitation: &Invitation,
        form: AcceptInvitationForm,
        messages: Messages,
    ) -> Result<User, AcceptError> {
        let checked = form.check();
        let mut errors = match &checked {
            Ok(_) => FieldErrors::default(),
            Err(errors) => errors.clone(),
        };
        if !invitation.is_pending() {
            errors.add("token", messages.t(MessageKey::InvitationAlreadyAccepted));
        }

        let users = self.database.users();
        if let Ok(account) = &checked {
            if users.username_exists(&account.username).await? {
                errors.add("username", messages.t(MessageKey::UsernameTaken));
            }
        }
        if users.email_exists(&invitation.email).await? {
            errors.add("email", messages.t(MessageKey::EmailTaken));
        }

        let account = match checked {
            Ok(account) if errors.is_empty() => account,
            _ => return Err(AcceptError::Invalid(errors)),
        };

        let password_digest = hash_password(account.password).await?;
        let now = self.now();
        let mut tx = self.database.begin().await?;

        let user = users
            .insert(
                &mut tx,
                &NewUser {
                    email: &invitation.email,
                    first_name: &account.first_name,
                    last_name: &account.last_name,
                    username: &account.username,
                    password_digest: &password_digest,
                    created_at: now,
                },
            )
            .await
            .map_err(|err| match err {
                UserError::UsernameTaken => AcceptError::Invalid(FieldErrors::single(
                    "username",
                    messages.t(MessageKey::UsernameTaken),
                )),
                UserError::EmailTaken => AcceptError::Invalid(FieldErrors::single(
                    "email",
                    messages.t(MessageKey::EmailTaken),
                )),
                other => AcceptError::User(other),
            })?;

        self.database
            .invitations()
            .mark_accepted(&mut tx, invitation.id, now)
            .await
            .map_err(|err| match err {
                InvitationError::AlreadyAccepted => AcceptError::Invalid(FieldErrors::single(
                    "token",
                    messages.t(MessageKey::InvitationAlreadyAccepted),
                )),
                other => AcceptError::Invitation(other),
            })?;

        self.database
            .memberships()
            .insert(
                &mut tx,
                &NewMembership {
                    user_id: user.id,
                    group_id: invitation.group_id,
                    role: Role::Member,
                    created_at: now,
                },
            )
            .await
            .map_err(|err| match err {
                MembershipError::AlreadyMember => AcceptError::AlreadyMember,
                other => AcceptError::Membership(other),
            })?;

        tx.commit().await?;
        counter!("invitations_accepted_total").increment(1);
        info!(
            stage = "accept",
            invitation_id = invitation.id,
            group_id = invitation.group_id,
            user_id = user.id,
            "invitation accepted"
        );
        Ok(user)
    }
}

/// 32 random bytes rendered as URL-safe base64 without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("could not generate a unique invitation token")]
    TokenExhausted,
    #[error("invitation error: {0}")]
    Invitation(#[from] InvitationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("account fields are invalid")]
    Invalid(FieldErrors),
    #[error("user is already a member of the group")]
    AlreadyMember,
    #[error("user error: {0}")]
    User(#[from] UserError),
    #[error("invitation error: {0}")]
    Invitation(InvitationError),
    #[error("membership error: {0}")]
    Membership(MembershipError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
