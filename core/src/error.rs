use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::Qid;

/// Failures while reading a corpus directory or file.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("malformed corpus entry {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("corpus location {0} does not exist")]
    NotFound(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Transport-level failures from a completion backend.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service returned no message content")]
    EmptyResponse,
}

#[derive(Debug, Clone, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("response is not a JSON object: {0}")]
    InvalidJson(String),
    #[error("response has no `retrieve` field")]
    MissingRetrieve,
    #[error("`retrieve` is not an integer: {0}")]
    NonIntegerRetrieve(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("dispatched qid {dispatched} but the task reported qid {reported}")]
    QidMismatch { dispatched: Qid, reported: Qid },
    #[error("task aborted: {0}")]
    TaskAborted(String),
}

impl FailureCause {
    /// Transport problems may succeed on a later attempt; malformed answers will not.
    pub fn is_retryable(&self) -> bool { matches!(self, FailureCause::Oracle(_) | FailureCause::Timeout(_)) }
}

/// A question that produced no answer.
#[derive(Debug, Clone, Error)]
#[error("question {qid}: {cause}")]
pub struct RankingFailure {
    pub qid: Qid,
    pub cause: FailureCause,
}

impl RankingFailure {
    pub fn new(qid: Qid, cause: impl Into<FailureCause>) -> Self { Self { qid, cause: cause.into() } }
}
