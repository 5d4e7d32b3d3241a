use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use underdoc_client::{BatchInput, BatchMode, Client};
use underdoc_core::{
    paths_matching, ClientConfig, DocumentInput, ExtractionResult, Job, JobId, JobStatus,
    UnderdocError,
};

/// Extract structured expense data from receipt and invoice images.
#[derive(Parser)]
#[command(name = "underdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit documents and wait for their results
    Extract(ExtractArgs),

    /// Submit a document without waiting; prints the job id
    Submit(InputArgs),

    /// Check a previously submitted job once
    Status {
        /// Job identifier returned by `submit`
        job_id: String,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Image file path or http(s) URL
    input: String,
}

#[derive(Args)]
struct ExtractArgs {
    /// Image file paths, glob patterns (quote them), http(s) URLs, or, when
    /// built with S3 support, s3://bucket/key objects and s3://bucket buckets
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Process documents one at a time
    #[arg(long)]
    sequential: bool,

    /// Number of documents in flight
    #[arg(short = 'j', long, default_value = "4")]
    concurrency: usize,

    /// Overall wait budget per document, in seconds
    #[arg(long)]
    max_wait: Option<u64>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ErrorReport {
    kind: String,
    message: String,
}

impl From<&UnderdocError> for ErrorReport {
    fn from(e: &UnderdocError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ItemReport<'a> {
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match rendered {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Failed to render output"),
    }
}

fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Turns one command-line input into the batch inputs it names.
async fn expand_input(input: &str) -> Result<Vec<BatchInput>, UnderdocError> {
    if input.starts_with("http://") || input.starts_with("https://") {
        return Ok(vec![BatchInput::Url(input.to_string())]);
    }

    #[cfg(feature = "s3")]
    if let Some((bucket, key)) = underdoc_client::parse_s3_url(input) {
        let source = underdoc_client::S3Source::from_env().await;
        let keys = match key {
            Some(key) => vec![key],
            None => source.list_images(&bucket).await?,
        };
        return Ok(keys
            .into_iter()
            .map(|key| BatchInput::S3Object {
                source: source.clone(),
                bucket: bucket.clone(),
                key,
            })
            .collect());
    }

    if is_pattern(input) {
        let paths = paths_matching(input)?;
        if paths.is_empty() {
            return Err(UnderdocError::Validation(format!("no image files match {input}")));
        }
        return Ok(paths.into_iter().map(BatchInput::Path).collect());
    }

    Ok(vec![BatchInput::Path(input.into())])
}

async fn load_input(client: &Client, input: &str) -> Result<DocumentInput, UnderdocError> {
    let mut expanded = expand_input(input).await?;
    if expanded.len() != 1 {
        return Err(UnderdocError::Validation(format!(
            "{input} names {} documents, expected exactly one",
            expanded.len()
        )));
    }
    match expanded.pop() {
        Some(single) => single.load(client).await,
        None => Err(UnderdocError::Validation(format!("{input} names no document"))),
    }
}

async fn run_extract(config: ClientConfig, args: ExtractArgs) -> Result<bool, UnderdocError> {
    let config = match args.max_wait {
        Some(secs) => config.with_max_wait(Duration::from_secs(secs)),
        None => config,
    };
    let client = Client::new(config)?;

    let mut inputs = Vec::new();
    let mut all_ok = true;
    for input in &args.inputs {
        match expand_input(input).await {
            Ok(expanded) => inputs.extend(expanded),
            Err(e) => {
                all_ok = false;
                print_json(
                    &ItemReport {
                        source: input,
                        result: None,
                        error: Some(ErrorReport::from(&e)),
                    },
                    args.pretty,
                );
            }
        }
    }

    let mode = if args.sequential {
        BatchMode::Sequential
    } else {
        BatchMode::Parallel {
            concurrency: args.concurrency,
        }
    };

    for item in client.extract_inputs(inputs, mode).await {
        let report = match &item.outcome {
            Ok(result) => ItemReport {
                source: &item.source,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                all_ok = false;
                ItemReport {
                    source: &item.source,
                    result: None,
                    error: Some(ErrorReport::from(e)),
                }
            }
        };
        print_json(&report, args.pretty);
    }

    Ok(all_ok)
}

async fn run_submit(config: ClientConfig, args: InputArgs) -> Result<bool, UnderdocError> {
    let client = Client::new(config)?;
    let document = load_input(&client, &args.input).await?;
    let job = client.submit_async(&document).await?;
    print_json(
        &serde_json::json!({ "job_id": job.id(), "status": job.status() }),
        false,
    );
    Ok(true)
}

async fn run_status(config: ClientConfig, job_id: String) -> Result<bool, UnderdocError> {
    let client = Client::new(config)?;
    let mut job = Job::new(JobId::new(job_id), JobStatus::Queued);
    match client.get_result(&mut job).await {
        Ok(result) => {
            print_json(&result, true);
            Ok(true)
        }
        Err(UnderdocError::NotReady { job_id, status }) => {
            print_json(&serde_json::json!({ "job_id": job_id, "status": status }), false);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("underdoc=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::Extract(args) => run_extract(config, args).await,
        Commands::Submit(args) => run_submit(config, args).await,
        Commands::Status { job_id } => run_status(config, job_id).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
