use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ooxml_replace::document::{format_bytes, segments_to_string};
use ooxml_replace::replace::{failures, load_rules};
use ooxml_replace::{
    document, BatchSummary, Config, ReplaceOptions, ReplaceResult, Replacer, ReportFormat,
};

#[derive(Parser)]
#[command(name = "ooxml-replace")]
#[command(about = "Bulk text replacement for .docx and .pptx files")]
#[command(version)]
struct Cli {
    /// Document or directory to process
    path: PathBuf,

    /// JSON file with a list of {"old": ..., "new": ...} rules
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Skip files whose name matches this glob
    #[arg(short, long)]
    exclude: Option<String>,

    /// Process files concurrently
    #[arg(short, long)]
    concurrent: bool,

    /// Number of concurrent workers (0 = all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Stream every file regardless of size
    #[arg(long)]
    streaming: bool,

    /// Sample memory usage while processing
    #[arg(long)]
    monitor: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the document text instead of replacing
    #[arg(long)]
    extract: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.extract {
        let mut doc = document::open(&cli.path)?;
        let segments = doc.get_text()?;
        doc.close()?;
        println!("{}", segments_to_string(&segments));
        return Ok(());
    }

    let Some(rules_path) = cli.rules.as_deref() else {
        bail!("--rules is required unless --extract is given");
    };
    let rules = load_rules(rules_path)?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let mut options = ReplaceOptions::from(&config);
    if cli.streaming {
        options.force_streaming = true;
    }
    if let Some(workers) = cli.workers {
        options.max_workers = workers;
    }
    if cli.monitor {
        options.enable_monitor = true;
    }

    let replacer = Replacer::new(options);

    let results = if cli.path.is_dir() {
        if cli.concurrent {
            replacer
                .replace_in_directory_concurrent(
                    &cli.path,
                    &rules,
                    cli.recursive,
                    cli.exclude.as_deref(),
                )
                .await?
        } else {
            replacer.replace_in_directory(
                &cli.path,
                &rules,
                cli.recursive,
                cli.exclude.as_deref(),
            )?
        }
    } else {
        vec![replacer.replace_in_file(&cli.path, &rules)]
    };

    report(&results, cli.format)?;
    BatchSummary::from_results(&results).into_result()?;
    Ok(())
}

fn report(results: &[ReplaceResult], format: ReportFormat) -> Result<()> {
    let summary = BatchSummary::from_results(results);

    match format {
        ReportFormat::Json => {
            let report = serde_json::json!({
                "results": results,
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportFormat::Text => {
            for result in results {
                let size = std::fs::metadata(&result.file_path)
                    .map(|m| format_bytes(m.len()))
                    .unwrap_or_else(|_| "-".to_string());
                let status = if result.success { "ok" } else { "FAILED" };
                println!(
                    "{:<6} {:>4} replacements  {:>10}  {}",
                    status,
                    result.replacements_applied,
                    size,
                    result.file_path.display()
                );
            }
            for (path, error) in failures(results) {
                eprintln!("{}: {}", path.display(), error);
            }
            println!(
                "{} files, {} failed, {} replacements",
                summary.total_files, summary.failed, summary.total_replacements
            );
        }
    }

    Ok(())
}
