use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const INVITATION_TEMPLATE: &str = "group-invitation";

/// Client for the transactional-email relay used to deliver invitations.
#[derive(Clone)]
pub struct MailerClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl MailerClient {
    /// Creates a new client. `base_url` should end with a slash so relative paths join under it.
    pub fn new(base_url: Url, api_key: impl Into<String>, http: Client) -> Self {
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Parses `base_url`, appending the trailing slash when missing.
    pub fn from_config(
        base_url: &str,
        api_key: impl Into<String>,
        http: Client,
    ) -> Result<Self, MailerError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(Self::new(Url::parse(&normalized)?, api_key, http))
    }

    /// Queues an invitation email with the relay.
    pub async fn send_invitation(
        &self,
        email: &InvitationEmail<'_>,
    ) -> Result<SentMessage, MailerError> {
        let url = self.base_url.join("messages")?;
        let body = MessageRequest {
            to: email.to,
            template: INVITATION_TEMPLATE,
            variables: InvitationVariables {
                group_name: email.group_name,
                accept_url: email.accept_url,
            },
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        parse_json(response).await
    }
}

/// Content of a single invitation email.
#[derive(Debug, Clone, Copy)]
pub struct InvitationEmail<'a> {
    pub to: &'a str,
    pub group_name: &'a str,
    pub accept_url: &'a str,
}

/// Acknowledgement returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    to: &'a str,
    template: &'static str,
    variables: InvitationVariables<'a>,
}

#[derive(Debug, Serialize)]
struct InvitationVariables<'a> {
    group_name: &'a str,
    accept_url: &'a str,
}

/// Errors produced by the mailer client.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, MailerError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(MailerError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> MailerClient {
        MailerClient::from_config(
            &server.url("/v1"),
            "api-key",
            Client::builder().build().expect("client"),
        )
        .expect("mailer")
    }

    fn email() -> InvitationEmail<'static> {
        InvitationEmail {
            to: "a@x.com",
            group_name: "Food co-op",
            accept_url: "https://groups.example.com/invitations/tok",
        }
    }

    #[tokio::test]
    async fn send_invitation_posts_template() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("Authorization", "Bearer api-key")
                    .json_body(json!({
                        "to": "a@x.com",
                        "template": "group-invitation",
                        "variables": {
                            "group_name": "Food co-op",
                            "accept_url": "https://groups.example.com/invitations/tok"
                        }
                    }));
                then.status(202).json_body(json!({ "id": "msg-1" }));
            })
            .await;

        let sent = client(&server)
            .send_invitation(&email())
            .await
            .expect("send");
        mock.assert_async().await;
        assert_eq!(sent.id, "msg-1");
    }

    #[tokio::test]
    async fn error_status_returns_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/messages");
                then.status(422).body("invalid recipient");
            })
            .await;

        let err = client(&server)
            .send_invitation(&email())
            .await
            .expect_err("should error");
        match err {
            MailerError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(body, "invalid recipient");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn from_config_appends_trailing_slash() {
        let client = MailerClient::from_config(
            "https://mail.example.com/api",
            "key",
            Client::builder().build().expect("client"),
        )
        .expect("mailer");
        assert_eq!(client.base_url.as_str(), "https://mail.example.com/api/");
    }
}
