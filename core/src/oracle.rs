//! Ranking oracle client: builds the ranking prompt, calls a completion
//! backend and turns its reply into a [`RankingResult`].

use crate::error::{FailureCause, OracleError, RankingFailure};
use crate::{DocId, Qid, Question, RankingResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

lazy_static! {
    static ref FENCED: Regex = Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A text-generation service. Implementations return the raw message text.
pub trait Completion: Send + Sync + 'static {
    fn complete(&self, request: &CompletionRequest) -> impl Future<Output = Result<String, OracleError>> + Send;
}

impl<T: Completion> Completion for Arc<T> {
    fn complete(&self, request: &CompletionRequest) -> impl Future<Output = Result<String, OracleError>> + Send {
        (**self).complete(request)
    }
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Total attempts per question; 1 disables retries.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 100,
            timeout: Duration::from_secs(120),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

pub struct RankingClient<C> {
    backend: C,
    config: OracleConfig,
}

impl<C: Completion> RankingClient<C> {
    pub fn new(backend: C, config: OracleConfig) -> Self { Self { backend, config } }

    pub fn config(&self) -> &OracleConfig { &self.config }

    /// Ask the backend which candidate in `context` best answers `question`.
    pub async fn rank(&self, question: &Question, context: &str) -> Result<RankingResult, RankingFailure> {
        let request = CompletionRequest {
            prompt: ranking_prompt(&question.query, context),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let cause = match timeout(self.config.timeout, self.backend.complete(&request)).await {
                Ok(Ok(text)) => {
                    tracing::debug!(qid = question.qid, response = %text, "oracle replied");
                    return parse_ranking_response(question.qid, &text);
                }
                Ok(Err(err)) => FailureCause::from(err),
                Err(_) => FailureCause::Timeout(self.config.timeout),
            };
            if attempt >= attempts || !cause.is_retryable() {
                return Err(RankingFailure::new(question.qid, cause));
            }
            let delay = self.config.retry_backoff.saturating_mul(1u32 << (attempt - 1).min(16));
            tracing::warn!(qid = question.qid, attempt, error = %cause, ?delay, "oracle call failed, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

pub fn ranking_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant. Use the reference documents below to answer the user's question.\n\
         Find the document id that is most relevant to the question. Output only the document id and nothing else.\n\
         Reference documents may contain similar information; analyse their differences and choose the single most relevant document.\n\
         \n\
         Reference documents:\n\
         {context}\n\
         Question:\n\
         {query}\n\
         \n\
         Answer as a JSON object of the form:\n\
         {{\n    \"retrieve\": <document id: int>\n}}"
    )
}

/// Parse `{"retrieve": <id>}` from an oracle reply.
///
/// Accepts a surrounding markdown code fence, a string-encoded integer and an integral float.
pub fn parse_ranking_response(qid: Qid, text: &str) -> Result<RankingResult, RankingFailure> {
    let trimmed = text.trim();
    let body = FENCED.captures(trimmed).and_then(|c| c.get(1)).map_or(trimmed, |m| m.as_str());
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RankingFailure::new(qid, FailureCause::InvalidJson(e.to_string())))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RankingFailure::new(qid, FailureCause::InvalidJson(format!("expected an object, got {value}"))))?;
    let retrieve = match obj.get("retrieve") {
        None | Some(serde_json::Value::Null) => return Err(RankingFailure::new(qid, FailureCause::MissingRetrieve)),
        Some(v) => doc_id_from_value(v).ok_or_else(|| RankingFailure::new(qid, FailureCause::NonIntegerRetrieve(v.to_string())))?,
    };
    Ok(RankingResult { qid, retrieve })
}

fn doc_id_from_value(value: &serde_json::Value) -> Option<DocId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| {
            // integral floats such as 7.0
            n.as_f64().filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64).map(|f| f as DocId)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn parses_plain_and_fenced_replies() {
        assert_eq!(parse_ranking_response(4, r#"{"retrieve": 12}"#).unwrap(), RankingResult { qid: 4, retrieve: 12 });
        let fenced = "```json\n{\"retrieve\": \"7\"}\n```";
        assert_eq!(parse_ranking_response(4, fenced).unwrap().retrieve, 7);
    }

    #[test]
    fn accepts_integral_floats() {
        assert_eq!(parse_ranking_response(1, r#"{"retrieve": 7.0}"#).unwrap(), RankingResult { qid: 1, retrieve: 7 });
        assert!(matches!(parse_ranking_response(1, r#"{"retrieve": -3.0}"#).unwrap_err().cause, FailureCause::NonIntegerRetrieve(_)));
    }

    #[test]
    fn rejects_malformed_replies() {
        let cause = |text: &str| parse_ranking_response(1, text).unwrap_err().cause;
        assert!(matches!(cause("retrieve: 3"), FailureCause::InvalidJson(_)));
        assert!(matches!(cause("[3]"), FailureCause::InvalidJson(_)));
        assert!(matches!(cause(r#"{"qid": 1}"#), FailureCause::MissingRetrieve));
        assert!(matches!(cause(r#"{"retrieve": 2.5}"#), FailureCause::NonIntegerRetrieve(_)));
        assert!(matches!(cause(r#"{"retrieve": "two"}"#), FailureCause::NonIntegerRetrieve(_)));
        assert!(matches!(cause(r#"{"retrieve": -4}"#), FailureCause::NonIntegerRetrieve(_)));
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = ranking_prompt("which doc?", "Document 1: {\n{x}\n}\n");
        assert!(prompt.contains("Document 1: {"));
        assert!(prompt.contains("Question:\nwhich doc?"));
        assert!(prompt.contains("\"retrieve\""));
    }

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl Completion for Flaky {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(OracleError::Transport("connection reset".into()))
            } else {
                Ok(r#"{"retrieve": 2}"#.into())
            }
        }
    }

    fn question() -> Question {
        Question { category: "finance".into(), qid: 9, query: "q".into(), source: vec![1, 2] }
    }

    fn config(max_attempts: u32) -> OracleConfig {
        OracleConfig { max_attempts, retry_backoff: Duration::from_millis(1), ..OracleConfig::default() }
    }

    #[tokio::test]
    async fn transport_errors_fail_without_retries() {
        let client = RankingClient::new(Flaky { calls: AtomicU32::new(0), fail_first: 1 }, config(1));
        let err = client.rank(&question(), "ctx").await.unwrap_err();
        assert_eq!(err.qid, 9);
        assert!(matches!(err.cause, FailureCause::Oracle(OracleError::Transport(_))));
    }

    #[tokio::test]
    async fn retries_recover_from_transport_errors() {
        let client = RankingClient::new(Flaky { calls: AtomicU32::new(0), fail_first: 2 }, config(3));
        let result = client.rank(&question(), "ctx").await.unwrap();
        assert_eq!(result, RankingResult { qid: 9, retrieve: 2 });
        assert_eq!(client.backend.calls.load(Ordering::SeqCst), 3);
    }

    struct Hung;

    impl Completion for Hung {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, OracleError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_calls_time_out() {
        let cfg = OracleConfig { timeout: Duration::from_millis(20), ..OracleConfig::default() };
        let err = RankingClient::new(Hung, cfg).rank(&question(), "ctx").await.unwrap_err();
        assert!(matches!(err.cause, FailureCause::Timeout(_)));
    }
}
