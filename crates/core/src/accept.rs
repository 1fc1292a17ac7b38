use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

const BLANK: &str = "can't be blank";
const CONFIRMATION_MISMATCH: &str = "doesn't match Password";

/// Account fields submitted when accepting an invitation.
///
/// Every field is optional at the wire level so that missing values are
/// reported as field errors instead of a rejected body. Unknown fields are
/// rejected.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AcceptInvitationForm {
    /// Tolerated for clients that echo the path token; the path wins.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    #[validate(
        required(message = "can't be blank"),
        length(min = 3, max = 40, message = "must be between 3 and 40 characters")
    )]
    pub username: Option<String>,
    #[serde(default)]
    #[validate(
        required(message = "can't be blank"),
        length(max = 100, message = "is too long")
    )]
    pub first_name: Option<String>,
    #[serde(default)]
    #[validate(
        required(message = "can't be blank"),
        length(max = 100, message = "is too long")
    )]
    pub last_name: Option<String>,
    #[serde(default)]
    #[validate(
        required(message = "can't be blank"),
        length(min = 8, max = 72, message = "must be between 8 and 72 characters")
    )]
    pub password: Option<String>,
    #[serde(default)]
    #[validate(required(message = "can't be blank"))]
    pub password_confirmation: Option<String>,
}

impl AcceptInvitationForm {
    /// Trims name fields and turns blank values into absent ones.
    ///
    /// Passwords keep their inner whitespace and are only cleared when blank.
    pub fn normalized(self) -> Self {
        Self {
            token: self.token,
            username: trimmed(self.username),
            first_name: trimmed(self.first_name),
            last_name: trimmed(self.last_name),
            password: non_blank(self.password),
            password_confirmation: non_blank(self.password_confirmation),
        }
    }

    /// Normalizes and validates the form, returning field-keyed errors.
    pub fn check(self) -> Result<ValidAccount, FieldErrors> {
        let form = self.normalized();
        let mut errors = match form.validate() {
            Ok(()) => FieldErrors::default(),
            Err(err) => FieldErrors::from(err),
        };
        if form.password_confirmation.is_some() && form.password_confirmation != form.password {
            errors.add("password_confirmation", CONFIRMATION_MISMATCH);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        match (form.username, form.first_name, form.last_name, form.password) {
            (Some(username), Some(first_name), Some(last_name), Some(password)) => {
                Ok(ValidAccount {
                    username,
                    first_name,
                    last_name,
                    password,
                })
            }
            (username, first_name, last_name, password) => {
                let mut errors = FieldErrors::default();
                for (field, missing) in [
                    ("username", username.is_none()),
                    ("first_name", first_name.is_none()),
                    ("last_name", last_name.is_none()),
                    ("password", password.is_none()),
                ] {
                    if missing {
                        errors.add(field, BLANK);
                    }
                }
                Err(errors)
            }
        }
    }
}

/// Account fields that passed form validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAccount {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}

/// Validation messages keyed by field name, serialized as `{field: [message]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(value: ValidationErrors) -> Self {
        let mut errors = Self::default();
        for (field, failures) in value.field_errors() {
            for failure in failures.iter() {
                let message = failure
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| failure.code.to_string());
                errors.add(&field.to_string(), message);
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> AcceptInvitationForm {
        AcceptInvitationForm {
            token: None,
            username: Some("ada".into()),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            password: Some("correct horse".into()),
            password_confirmation: Some("correct horse".into()),
        }
    }

    #[test]
    fn accepts_complete_form() {
        let account = form().check().expect("valid form");
        assert_eq!(account.username, "ada");
        assert_eq!(account.password, "correct horse");
    }

    #[test]
    fn trims_names_before_validation() {
        let mut input = form();
        input.username = Some("  ada  ".into());
        let account = input.check().expect("valid form");
        assert_eq!(account.username, "ada");
    }

    #[test]
    fn mismatched_confirmation_is_keyed_on_confirmation() {
        let mut input = form();
        input.password_confirmation = Some("something else".into());

        let errors = input.check().expect_err("mismatch");
        assert!(errors.contains("password_confirmation"));
        assert!(!errors.contains("password"));
        assert_eq!(
            errors.messages("password_confirmation"),
            [CONFIRMATION_MISMATCH.to_string()]
        );
    }

    #[test]
    fn blank_fields_are_reported_as_blank() {
        let input = AcceptInvitationForm {
            first_name: Some("   ".into()),
            ..AcceptInvitationForm::default()
        };

        let errors = input.check().expect_err("blank form");
        for field in ["username", "first_name", "last_name", "password"] {
            assert_eq!(errors.messages(field), [BLANK.to_string()], "{field}");
        }
    }

    #[test]
    fn short_password_is_rejected() {
        let mut input = form();
        input.password = Some("short".into());
        input.password_confirmation = Some("short".into());

        let errors = input.check().expect_err("short password");
        assert!(errors.contains("password"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed = serde_json::from_value::<AcceptInvitationForm>(json!({
            "username": "ada",
            "admin": true
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn serializes_as_field_map() {
        let mut errors = FieldErrors::single("username", "has already been taken");
        errors.add("username", "is too short");
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({ "username": ["has already been taken", "is too short"] })
        );
    }
}
