//! Boundary to the external quiz and semantic-search service.
//!
//! The service proposes the next question to ask and a set of candidate
//! establishments. Nothing it returns is trusted for price, capacity or
//! availability; every hit is re-validated against the live catalog.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::params::{self, ParamMap};

/// Answer to "what should we ask next?".
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuizOutcome {
    #[serde(rename = "quiz_completed")]
    pub completed: bool,
    #[serde(default)]
    pub key_to_collect: Option<String>,
    #[serde(default, rename = "missing_quiz")]
    pub question: Option<String>,
    #[serde(default, rename = "final_params")]
    pub params: ParamMap,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// One candidate establishment proposed by semantic search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub establishment_id: String,
    #[serde(default)]
    pub relevance_score: Option<f32>,
}

#[derive(Serialize)]
struct QuizRequest<'a> {
    #[serde(rename = "userPrompt")]
    user_prompt: &'a str,
    #[serde(rename = "currentParams")]
    current_params: &'a ParamMap,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    params: &'a ParamMap,
}

#[derive(Debug)]
pub enum CollaboratorError {
    Request(String),
    Timeout,
    Status { status: u16, body: String },
    Decode(String),
}

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaboratorError::Request(e) => write!(f, "request failed: {e}"),
            CollaboratorError::Timeout => write!(f, "timed out"),
            CollaboratorError::Status { status, body } => write!(f, "service answered {status}: {body}"),
            CollaboratorError::Decode(e) => write!(f, "undecodable response: {e}"),
        }
    }
}

impl std::error::Error for CollaboratorError {}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CollaboratorError::Timeout
        } else if e.is_decode() {
            CollaboratorError::Decode(e.to_string())
        } else {
            CollaboratorError::Request(e.to_string())
        }
    }
}

#[async_trait]
pub trait SearchCollaborator: Send + Sync {
    async fn generate_quiz(&self, prompt: &str, params: &ParamMap) -> Result<QuizOutcome, CollaboratorError>;

    async fn rag_search(&self, params: &ParamMap) -> Result<Vec<SearchHit>, CollaboratorError>;
}

/// JSON-over-HTTP client for the quiz/search service.
#[derive(Clone)]
pub struct HttpCollaborator {
    client: Client,
    base_url: String,
}

impl HttpCollaborator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + Sync, T: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/{route}", self.base_url))
            .json(body)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => response.json::<T>().await.map_err(CollaboratorError::from),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CollaboratorError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl SearchCollaborator for HttpCollaborator {
    async fn generate_quiz(&self, prompt: &str, params: &ParamMap) -> Result<QuizOutcome, CollaboratorError> {
        let request = QuizRequest {
            user_prompt: prompt,
            current_params: params,
        };
        self.post("generate-quiz", &request).await
    }

    async fn rag_search(&self, params: &ParamMap) -> Result<Vec<SearchHit>, CollaboratorError> {
        self.post("rag-search", &SearchRequest { params }).await
    }
}

// ── Fallback quiz ─────────────────────────────────────────────

const QUIZ_ORDER: &[(&str, &str)] = &[
    (params::CITY, "Which city are you travelling to?"),
    (params::CHECK_IN_DATE, "What date do you check in? (YYYY-MM-DD)"),
    (params::MAX_PRICE, "What is your maximum budget per booking?"),
    (params::NUM_GUESTS, "How many guests? (or: single, couple, friends, family)"),
    (
        params::AMENITIES_PRIORITY,
        "Which amenities matter most? (comma-separated, e.g. pool, spa, parking)",
    ),
];

const ROMANTIC_HINTS: &[&str] = &["romantic", "lãng mạn", "lang man", "honeymoon"];

/// Deterministic stand-in for the quiz service: ask for the first missing
/// key in a fixed order, or report the map complete.
pub fn fallback_quiz(prompt: &str, current: &ParamMap) -> QuizOutcome {
    let mut params = current.clone();
    let lowered = prompt.to_lowercase();
    if !params::has(&params, params::STYLE_VIBE) && ROMANTIC_HINTS.iter().any(|h| lowered.contains(h)) {
        params.insert(params::STYLE_VIBE.into(), "romantic".into());
    }

    let missing = QUIZ_ORDER.iter().find(|(key, _)| {
        let answered = params::has(&params, key)
            || (*key == params::NUM_GUESTS && params::has(&params, params::TRAVEL_COMPANION));
        !answered
    });

    match missing {
        Some((key, question)) => QuizOutcome {
            completed: false,
            key_to_collect: Some((*key).to_string()),
            question: Some((*question).to_string()),
            params,
            options: None,
        },
        None => QuizOutcome {
            completed: true,
            key_to_collect: None,
            question: None,
            params,
            options: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn map(v: Value) -> ParamMap {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn fallback_asks_in_fixed_order() {
        let q = fallback_quiz("", &ParamMap::new());
        assert!(!q.completed);
        assert_eq!(q.key_to_collect.as_deref(), Some("city"));

        let q = fallback_quiz("", &map(json!({"city": "dn", "check_in_date": "2025-06-01"})));
        assert_eq!(q.key_to_collect.as_deref(), Some("max_price"));
        assert!(q.question.is_some());

        let q = fallback_quiz("", &map(json!({"city": "dn", "check_in_date": "2025-06-01", "max_price": "  "})));
        assert_eq!(q.key_to_collect.as_deref(), Some("max_price"));
    }

    #[test]
    fn companion_answers_guest_question() {
        let q = fallback_quiz(
            "",
            &map(json!({
                "city": "dn", "check_in_date": "2025-06-01", "max_price": 100, "travel_companion": "couple"
            })),
        );
        assert_eq!(q.key_to_collect.as_deref(), Some("amenities_priority"));
    }

    #[test]
    fn fallback_completes_and_seeds_vibe() {
        let full = map(json!({
            "city": "dn", "check_in_date": "2025-06-01", "max_price": 100,
            "num_guests": 2, "amenities_priority": "pool"
        }));
        let q = fallback_quiz("Một chuyến đi Lãng mạn", &full);
        assert!(q.completed);
        assert_eq!(q.params.get("style_vibe"), Some(&json!("romantic")));
        assert_eq!(q.params.get("city"), Some(&json!("dn")));

        let plain = fallback_quiz("business trip", &full);
        assert!(!plain.params.contains_key("style_vibe"));
    }

    #[tokio::test]
    async fn http_quiz_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-quiz"))
            .and(body_partial_json(json!({"userPrompt": "beach", "currentParams": {"city": "dn"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quiz_completed": false,
                "key_to_collect": "check_in_date",
                "missing_quiz": "When?",
                "final_params": {"city": "dn"}
            })))
            .mount(&server)
            .await;

        let client = HttpCollaborator::new(server.uri(), Duration::from_secs(2)).unwrap();
        let q = client.generate_quiz("beach", &map(json!({"city": "dn"}))).await.unwrap();
        assert!(!q.completed);
        assert_eq!(q.key_to_collect.as_deref(), Some("check_in_date"));
        assert_eq!(q.question.as_deref(), Some("When?"));
    }

    #[tokio::test]
    async fn http_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rag-search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"establishment_id": "h1", "relevance_score": 0.9},
                {"establishment_id": "h2", "name": "extra fields are ignored"}
            ])))
            .mount(&server)
            .await;

        let client = HttpCollaborator::new(server.uri(), Duration::from_secs(2)).unwrap();
        let hits = client.rag_search(&ParamMap::new()).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].establishment_id, "h1");
        assert_eq!(hits[1].relevance_score, None);
    }

    #[tokio::test]
    async fn http_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-quiz"))
            .respond_with(ResponseTemplate::new(503).set_body_string("LLM not ready"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rag-search"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = HttpCollaborator::new(server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.generate_quiz("x", &ParamMap::new()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Status { status: 503, .. }), "{err}");
        let err = client.rag_search(&ParamMap::new()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Timeout), "{err}");
    }
}
