pub mod openai;

use anyhow::Result;
use clap::Parser;
use openai::{OpenAiChat, DEFAULT_API_BASE, DEFAULT_MODEL};
use retrieval_core::corpus::{Corpora, CorpusLayout};
use retrieval_core::oracle::{OracleConfig, RankingClient};
use retrieval_core::persist::{load_questions, now_rfc3339, save_answers, save_report, FailureEntry, RunReport};
use retrieval_core::pipeline::Retrieval;
use retrieval_core::scheduler::DEFAULT_MAX_TASKS;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "retriever")]
#[command(about = "Pick the most relevant reference document for each question with an LLM ranker")]
#[command(rename_all = "snake_case")]
pub struct Cli {
    /// Question file ({"questions": [...]})
    #[arg(long)]
    pub question_path: PathBuf,
    /// Directory holding the finance, insurance and faq corpora
    #[arg(long)]
    pub source_path: PathBuf,
    /// Where to write the answer file
    #[arg(long)]
    pub output_path: PathBuf,
    /// Maximum number of ranking calls in flight
    #[arg(long, default_value_t = DEFAULT_MAX_TASKS)]
    pub max_tasks: usize,
    /// Model name sent to the ranking service
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
    /// Root of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_API_BASE)]
    pub api_base: String,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,
    /// Response size cap, in tokens
    #[arg(long, default_value_t = 100)]
    pub max_output_tokens: u32,
    /// Per-call timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
    /// Attempts per question on transport errors or timeouts (1 = no retry)
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,
    /// Finance corpus directory, relative to source_path
    #[arg(long, default_value = "finance")]
    pub finance_dir: PathBuf,
    /// Insurance corpus directory, relative to source_path
    #[arg(long, default_value = "insurance")]
    pub insurance_dir: PathBuf,
    /// FAQ mapping file, relative to source_path
    #[arg(long, default_value = "faq/pid_map_content.json")]
    pub faq_file: PathBuf,
    /// Optional JSON run report with per-question failures
    #[arg(long)]
    pub report_path: Option<PathBuf>,
    /// Exit non-zero when any question failed
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

impl Cli {
    pub fn layout(&self) -> CorpusLayout {
        CorpusLayout {
            finance_dir: self.finance_dir.clone(),
            insurance_dir: self.insurance_dir.clone(),
            faq_file: self.faq_file.clone(),
        }
    }

    pub fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts.max(1),
            ..OracleConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub written: usize,
    pub failed: usize,
}

impl Summary {
    /// Process exit code: 2 when `strict` is set and any question failed, 0 otherwise.
    pub fn exit_status(&self, strict: bool) -> u8 {
        if strict && self.failed > 0 { 2 } else { 0 }
    }
}

/// Load inputs, rank every question and write the answer file.
///
/// Per-question failures are counted, never fatal; unreadable inputs are.
pub async fn run(args: &Cli) -> Result<Summary> {
    let started_at = now_rfc3339();
    tracing::info!(
        question_path = %args.question_path.display(),
        source_path = %args.source_path.display(),
        output_path = %args.output_path.display(),
        max_tasks = args.max_tasks,
        model = %args.model,
        "starting retrieval"
    );

    let questions = load_questions(&args.question_path)?.questions;
    tracing::info!(questions = questions.len(), "loaded questions");
    let corpora = Arc::new(Corpora::load(&args.source_path, &args.layout())?);

    let config = args.oracle_config();
    // the reqwest timeout sits slightly above the per-attempt timeout so the latter reports first
    let backend = OpenAiChat::new(&args.api_base, args.api_key.clone(), args.model.clone(), config.timeout + Duration::from_secs(5))?;
    let client = Arc::new(RankingClient::new(backend, config));
    let total = questions.len();
    let outcome = Retrieval::new(corpora, client).run(questions, args.max_tasks).await;

    let failed = outcome.failure_count();
    let written = save_answers(outcome.answers, &args.output_path)?;
    tracing::info!(written, path = %args.output_path.display(), "saved answers");

    if let Some(path) = &args.report_path {
        let report = RunReport {
            started_at,
            finished_at: now_rfc3339(),
            total,
            succeeded: written,
            failed,
            failures: outcome.failures.iter().map(FailureEntry::from).collect(),
        };
        save_report(&report, path)?;
        tracing::info!(path = %path.display(), "saved run report");
    }

    Ok(Summary { total, written, failed })
}
