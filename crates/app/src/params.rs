use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::problem::ProblemResponse;

/// Request parameters merged from the query string and a JSON object body.
///
/// Body fields override query fields of the same name. Query values arrive
/// as strings, so numeric fields that may come from either source should use
/// [`IntParam`]. The target DTO decides which fields are required and whether
/// unknown fields are rejected.
#[derive(Debug)]
pub struct Params<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Params<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ProblemResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = req.uri().query().unwrap_or_default().to_string();
        let body = Bytes::from_request(req, state).await.map_err(|err| {
            ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_body", err.body_text())
        })?;

        let mut fields = query_fields(&query)?;
        let from_body = !body.iter().all(u8::is_ascii_whitespace);
        if from_body {
            match serde_json::from_slice::<Value>(&body).map_err(invalid_body)? {
                Value::Object(object) => fields.extend(object),
                _ => {
                    return Err(ProblemResponse::new(
                        StatusCode::BAD_REQUEST,
                        "invalid_body",
                        "request body must be a JSON object",
                    ))
                }
            }
        }

        serde_json::from_value(Value::Object(fields))
            .map(Params)
            .map_err(|err| {
                let kind = if from_body { "invalid_body" } else { "invalid_params" };
                ProblemResponse::new(StatusCode::BAD_REQUEST, kind, err.to_string())
            })
    }
}

fn query_fields(query: &str) -> Result<Map<String, Value>, ProblemResponse> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).map_err(|err| {
        ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_params", err.to_string())
    })?;
    Ok(pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}

fn invalid_body(err: serde_json::Error) -> ProblemResponse {
    ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_body", err.to_string())
}

/// Integer parameter given either as a JSON number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntParam {
    Int(i64),
    Text(String),
}

impl IntParam {
    /// `None` when the text form is not an integer.
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(default)]
        group_id: Option<IntParam>,
        #[serde(default)]
        emails: Option<String>,
    }

    impl Sample {
        fn group_id(&self) -> Option<i64> {
            self.group_id.as_ref().and_then(IntParam::value)
        }
    }

    async fn extract(uri: &str, body: &'static str) -> Result<Sample, ProblemResponse> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        Params::<Sample>::from_request(request, &())
            .await
            .map(|Params(sample)| sample)
    }

    #[tokio::test]
    async fn reads_json_body() {
        let sample = extract("/bulk", r#"{"group_id": 4, "emails": "a@x.com"}"#)
            .await
            .expect("json body");
        assert_eq!(
            sample,
            Sample {
                group_id: Some(IntParam::Int(4)),
                emails: Some("a@x.com".into())
            }
        );
    }

    #[tokio::test]
    async fn falls_back_to_query_string() {
        let sample = extract("/bulk?group_id=4&emails=a%40x.com%2Cb%40y.com", "")
            .await
            .expect("query params");
        assert_eq!(sample.group_id(), Some(4));
        assert_eq!(sample.emails.as_deref(), Some("a@x.com,b@y.com"));
    }

    #[tokio::test]
    async fn merges_query_and_body_with_body_winning() {
        let sample = extract("/bulk?group_id=4&emails=q%40x.com", r#"{"emails": "b@x.com"}"#)
            .await
            .expect("merged params");
        assert_eq!(sample.group_id(), Some(4));
        assert_eq!(sample.emails.as_deref(), Some("b@x.com"));

        let sample = extract("/bulk?group_id=4", r#"{"group_id": 9}"#)
            .await
            .expect("body override");
        assert_eq!(sample.group_id(), Some(9));
    }

    #[tokio::test]
    async fn accepts_numeric_strings() {
        let sample = extract("/bulk", r#"{"group_id": " 12 "}"#)
            .await
            .expect("string id");
        assert_eq!(sample.group_id(), Some(12));

        let sample = extract("/bulk", r#"{"group_id": "twelve"}"#)
            .await
            .expect("text id");
        assert_eq!(sample.group_id, Some(IntParam::Text("twelve".into())));
        assert_eq!(sample.group_id(), None);
    }

    #[tokio::test]
    async fn rejects_unknown_fields() {
        let err = extract("/bulk", r#"{"group_id": 4, "role": "admin"}"#)
            .await
            .expect_err("unknown field");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.problem_type(), "invalid_body");

        let err = extract("/bulk?role=admin", "")
            .await
            .expect_err("unknown query field");
        assert_eq!(err.problem_type(), "invalid_params");
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let err = extract("/bulk", "{").await.expect_err("malformed");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_non_object_bodies() {
        let err = extract("/bulk", r#"["a@x.com"]"#)
            .await
            .expect_err("array body");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.problem_type(), "invalid_body");
    }
}
