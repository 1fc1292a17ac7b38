/// Identifiers of user-facing messages returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    BulkEmailsEmpty,
    BulkEmailsInvalid,
    ParamMissing,
    ParamInvalid,
    GroupNameBlank,
    InvitationAlreadyAccepted,
    UsernameTaken,
    EmailTaken,
}

impl MessageKey {
    /// Dotted key used in logs and as the fallback text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BulkEmailsEmpty => "onboarding.invitation.bulk.errors.empty",
            Self::BulkEmailsInvalid => "onboarding.invitation.bulk.errors.invalid",
            Self::ParamMissing => "errors.param_missing",
            Self::ParamInvalid => "errors.param_invalid",
            Self::GroupNameBlank => "groups.errors.name_blank",
            Self::InvitationAlreadyAccepted => "onboarding.invitation.accept.errors.accepted",
            Self::UsernameTaken => "account.user.errors.username_taken",
            Self::EmailTaken => "account.user.errors.email_taken",
        }
    }
}

/// Message catalog with per-locale translations and English fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Messages {
    #[default]
    En,
    Fr,
}

impl Messages {
    /// Picks the first supported language from an `Accept-Language` header value.
    pub fn negotiate(accept_language: Option<&str>) -> Self {
        let Some(header) = accept_language else {
            return Self::default();
        };
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .find_map(|tag| match tag.split('-').next() {
                Some("en") => Some(Self::En),
                Some("fr") => Some(Self::Fr),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn t(self, key: MessageKey) -> &'static str {
        match self {
            Self::En => english(key),
            Self::Fr => french(key).unwrap_or_else(|| english(key)),
        }
    }
}

fn english(key: MessageKey) -> &'static str {
    match key {
        MessageKey::BulkEmailsEmpty => "Please provide at least one email address",
        MessageKey::BulkEmailsInvalid => "No valid email addresses were provided",
        MessageKey::ParamMissing => "is missing",
        MessageKey::ParamInvalid => "is invalid",
        MessageKey::GroupNameBlank => "can't be blank",
        MessageKey::InvitationAlreadyAccepted => "has already been accepted",
        MessageKey::UsernameTaken => "has already been taken",
        MessageKey::EmailTaken => "already belongs to an account, sign in to join the group",
    }
}

fn french(key: MessageKey) -> Option<&'static str> {
    match key {
        MessageKey::BulkEmailsEmpty => Some("Veuillez indiquer au moins une adresse email"),
        MessageKey::BulkEmailsInvalid => Some("Aucune adresse email valide n'a été fournie"),
        MessageKey::ParamMissing => Some("est manquant"),
        MessageKey::ParamInvalid => Some("est invalide"),
        MessageKey::GroupNameBlank => Some("doit être rempli(e)"),
        MessageKey::InvitationAlreadyAccepted => Some("a déjà été acceptée"),
        MessageKey::EmailTaken => Some(
            "appartient déjà à un compte, connectez-vous pour rejoindre le groupe",
        ),
        MessageKey::UsernameTaken => None,
    }
}
