use anyhow::Result;
use clap::{Parser, Subcommand};
use retrieval_core::eval::{precision, validate_candidates, CandidateViolation};
use retrieval_core::persist::{load_answers, load_ground_truths, load_questions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "evaluator")]
#[command(about = "Score and sanity-check retrieval answer files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare predictions with ground truth, matched by qid
    Precision {
        #[arg(long)]
        predictions: PathBuf,
        #[arg(long = "ground_truth")]
        ground_truth: PathBuf,
    },
    /// Check that every answer picks one of its question's candidates
    Validate {
        #[arg(long)]
        predictions: PathBuf,
        #[arg(long = "question_path")]
        question_path: PathBuf,
    },
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn main() -> Result<ExitCode> {
    fmt().with_env_filter(log_filter()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Precision { predictions, ground_truth } => report_precision(&predictions, &ground_truth),
        Commands::Validate { predictions, question_path } => report_violations(&predictions, &question_path),
    }
}

fn report_precision(predictions: &Path, ground_truth: &Path) -> Result<ExitCode> {
    let answers = load_answers(predictions)?.answers;
    let truths = load_ground_truths(ground_truth)?.ground_truths;
    tracing::info!(answers = answers.len(), truths = truths.len(), "loaded evaluation inputs");

    let report = precision(&answers, &truths);
    for m in &report.mismatches {
        println!("QID: {}", m.qid);
        println!("Prediction: {}, Ground Truth: {}", m.predicted, m.expected);
    }
    if !report.missing.is_empty() {
        println!("Missing predictions for {} questions: {:?}", report.missing.len(), report.missing);
    }
    for (category, tally) in &report.per_category {
        println!("{category}: {}/{} precision {:.4}", tally.correct, tally.total, tally.precision());
    }
    println!("Precision: {:.4}", report.overall.precision());
    Ok(ExitCode::SUCCESS)
}

fn report_violations(predictions: &Path, question_path: &Path) -> Result<ExitCode> {
    let answers = load_answers(predictions)?.answers;
    let questions = load_questions(question_path)?.questions;
    let violations = validate_candidates(&answers, &questions);
    for v in &violations {
        match v {
            CandidateViolation::OutsideCandidates { qid, retrieve } => {
                println!("qid {qid}: retrieved document {retrieve} is not among its candidates")
            }
            CandidateViolation::UnknownQid { qid } => println!("qid {qid}: not present in the question file"),
        }
    }
    println!("checked {} answers, {} violations", answers.len(), violations.len());
    Ok(if violations.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
