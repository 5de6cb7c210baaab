use anyhow::Result;
use clap::Parser;
use retriever::{run, Cli};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Cli::parse();

    let summary = run(&args).await?;
    println!(
        "done: questions={} answers={} failures={} -> {}",
        summary.total,
        summary.written,
        summary.failed,
        args.output_path.display()
    );

    Ok(ExitCode::from(summary.exit_status(args.strict)))
}
