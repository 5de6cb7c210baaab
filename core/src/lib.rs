pub mod context;
pub mod corpus;
pub mod error;
pub mod eval;
pub mod oracle;
pub mod persist;
pub mod pipeline;
pub mod scheduler;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FailureCause;

pub type DocId = u64;
pub type Qid = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Finance,
    Insurance,
    Faq,
}

impl Category {
    pub fn parse(raw: &str) -> Result<Self, FailureCause> {
        match raw {
            "finance" => Ok(Category::Finance),
            "insurance" => Ok(Category::Insurance),
            "faq" => Ok(Category::Faq),
            other => Err(FailureCause::UnknownCategory(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Finance => "finance",
            Category::Insurance => "insurance",
            Category::Faq => "faq",
        }
    }

    /// Finance and insurance documents are structured filings; faq entries are opaque.
    pub fn is_filing(&self) -> bool { matches!(self, Category::Finance | Category::Insurance) }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Raw category text; resolved per question so an unknown value fails only that question.
    pub category: String,
    pub qid: Qid,
    pub query: String,
    pub source: Vec<DocId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<Question>,
}

/// A loaded reference document. Filings that lack the expected fields are kept as `Opaque`.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Filing { combined_responses: serde_json::Value, raw_text: String },
    Opaque(serde_json::Value),
}

impl Document {
    pub fn from_filing_value(value: serde_json::Value) -> Self {
        #[derive(Deserialize)]
        struct FilingFields {
            combined_responses: serde_json::Value,
            raw_text: String,
        }
        match serde_json::from_value::<FilingFields>(value.clone()) {
            Ok(f) => Document::Filing { combined_responses: f.combined_responses, raw_text: f.raw_text },
            Err(_) => Document::Opaque(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankingResult {
    pub qid: Qid,
    pub retrieve: DocId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSet {
    pub answers: Vec<RankingResult>,
}
