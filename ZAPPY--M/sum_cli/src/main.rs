use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use tokio::runtime::Runtime;
use zappy_summarizer::{
    DocumentSource, ModelSuite, ParallelSummarizer, PlainTextSource, SizeClass,
    SummarizationPipeline, SummarizerConfig, SummarizerTelemetry,
};

#[derive(Parser, Debug)]
#[command(name = "sumr", version, about = "Structured document summarizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarizes a text document.
    Summarize(SummarizeArgs),
    /// Prints sections, importance and terms as JSON.
    Inspect {
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        max_pages: usize,
    },
    /// Prints the default configuration as TOML.
    Config,
}

#[derive(Parser, Debug)]
struct SummarizeArgs {
    input: PathBuf,
    #[arg(long, default_value = "medium")]
    size: SizeClass,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Writes the JSON run report here.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Section workers; 0 uses every core.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, default_value = "ZAPPY--M/summarizer/logs")]
    log_dir: PathBuf,
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Verifies with TF-IDF instead of embeddings.
    #[arg(long)]
    lexical_only: bool,
    #[arg(long, default_value_t = 50)]
    max_pages: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Summarize(args) => handle_summarize(&args),
        Commands::Inspect {
            input,
            config,
            max_pages,
        } => {
            let config = load_config(config.as_deref())?;
            let text = load_document(&input, max_pages)?;
            let pipeline = SummarizationPipeline::new(config, ModelSuite::builtin(), None)?;
            println!("{}", serde_json::to_string_pretty(&pipeline.inspect(&text))?);
            Ok(())
        }
        Commands::Config => {
            print!("{}", SummarizerConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn handle_summarize(args: &SummarizeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    let text = load_document(&args.input, args.max_pages)?;

    let log_path = compute_log_path(&args.log_dir)?;
    let mut builder = SummarizerTelemetry::builder("sumr").log_path(&log_path);
    if let Some(path) = &args.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        builder = builder.event_publisher(Arc::new(publisher));
    }
    let telemetry = builder.build()?;
    telemetry.log(
        LogLevel::Info,
        "sumr.summarize.started",
        json!({ "input": args.input, "size": args.size.label() }),
    )?;

    let models = if args.lexical_only {
        ModelSuite::lexical_only()
    } else {
        ModelSuite::builtin()
    };
    let pipeline = Arc::new(SummarizationPipeline::new(
        config,
        models,
        Some(telemetry.clone()),
    )?);
    let summarizer = ParallelSummarizer::new(pipeline);

    let runtime = Runtime::new()?;
    let outcome = runtime.block_on(async {
        let outcome = summarizer.run(&text, args.size).await;
        telemetry.flush().await;
        outcome
    });
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            telemetry.log(
                LogLevel::Error,
                "sumr.summarize.failed",
                json!({ "input": args.input, "error": err.to_string() }),
            )?;
            return Err(err).context("summarization failed");
        }
    };

    match &args.output {
        Some(path) => write_file(path, &report.output)?,
        None => println!("{}", report.output),
    }
    if let Some(path) = &args.report {
        write_file(path, &serde_json::to_string_pretty(&report)?)?;
    }
    let status = json!({
        "run_id": report.run_id,
        "size": report.size_class.label(),
        "sections": report.sections.len(),
        "degraded": report.degraded_sections(),
        "target_words": report.target_words,
        "summary_words": report.document.word_count(),
        "log_path": log_path,
    });
    telemetry.log(LogLevel::Info, "sumr.summarize.completed", status.clone())?;
    if args.output.is_some() {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SummarizerConfig> {
    match path {
        Some(path) => SummarizerConfig::load(path),
        None => Ok(SummarizerConfig::default()),
    }
}

fn load_document(path: &Path, max_pages: usize) -> Result<String> {
    let document = PlainTextSource::new(max_pages).extract(path)?;
    if !document.is_valid {
        bail!(
            "{} rejected: {}",
            path.display(),
            document.message.unwrap_or_else(|| "invalid document".into())
        );
    }
    Ok(document.text)
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir).with_context(|| format!("creating log dir {}", dir.display()))?;
    Ok(dir.join(format!(
        "sumr-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}
