//! bioetl - ChEMBL entity extraction CLI

use bioetl::cancellation::CancellationToken;
use bioetl::config::{ConfigLoader, PipelineConfig, CONFIG_ROOT_ENV, DEFAULT_CONFIG_ROOT};
use bioetl::errors::EtlError;
use bioetl::logging::{init_logging, LogLevel, LoggingConfig};
use bioetl::pipeline::{Pipeline, RunOptions};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bioetl")]
#[command(author, version, about = "Deterministic ChEMBL entity extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config root holding `pipelines/<provider>/<entity>.yaml`
    #[arg(long, global = true, env = CONFIG_ROOT_ENV, default_value = DEFAULT_CONFIG_ROOT)]
    config_root: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one pipeline, e.g. `activity_chembl`
    Run {
        /// Pipeline name, `<entity>_<provider>`
        pipeline: String,

        /// Explicit config document instead of the one under the config root
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum records to extract
        #[arg(short, long)]
        limit: Option<usize>,

        /// Stop after hashing; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// List pipelines found under the config root
    ListPipelines,
}

fn load_config(
    loader: &ConfigLoader,
    pipeline: &str,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<PipelineConfig, EtlError> {
    let mut resolved = match config {
        Some(path) => PipelineConfig::from_path(&path)?,
        None => loader.load(pipeline)?,
    };
    if resolved.id != pipeline {
        return Err(EtlError::config(format!(
            "config id '{}' does not match pipeline '{pipeline}'",
            resolved.id
        )));
    }
    if let Some(output) = output {
        resolved.output_path = output;
    }
    resolved.validate()?;
    Ok(resolved)
}

async fn run(
    loader: &ConfigLoader,
    pipeline: &str,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    options: RunOptions,
    verbose: bool,
) -> Result<(), EtlError> {
    let config = load_config(loader, pipeline, config, output)?;

    let mut logging: LoggingConfig = config.logging.clone();
    if verbose {
        logging = logging.with_level(LogLevel::Debug);
    }
    if let Err(e) = init_logging(&logging) {
        eprintln!("warning: {e:#}");
    }

    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            watcher.cancel("interrupted");
        }
    });

    let result = Pipeline::new(config)?
        .with_cancellation(token)
        .run(options)
        .await?;
    info!("{}", result.summary());
    for message in &result.errors {
        warn!(error = %message, "Skipped stage failure");
    }
    result.ensure_success()
}

fn exit_status(outcome: &Result<(), EtlError>) -> u8 {
    match outcome {
        Ok(()) => 0,
        Err(e) => {
            error!(kind = %e.root_kind(), "{e}");
            eprintln!("error: {e}");
            u8::try_from(e.exit_code()).unwrap_or(1)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loader = ConfigLoader::new(cli.config_root.clone());

    match cli.command {
        Command::ListPipelines => {
            for name in loader.list_pipelines() {
                println!("{name}");
            }
            ExitCode::SUCCESS
        }
        Command::Run {
            pipeline,
            config,
            output,
            limit,
            dry_run,
        } => {
            let options = RunOptions { dry_run, limit };
            let outcome = run(&loader, &pipeline, config, output, options, cli.verbose).await;
            ExitCode::from(exit_status(&outcome))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_config(dir: &std::path::Path, base_url: &str) -> PathBuf {
        let text = format!(
            "id: target_chembl\nprovider: chembl\nentity: target\noutput_path: {}\n\
             provider_config:\n  base_url: {base_url}\n\
             features:\n  stage_policies: {{extract: skip}}\n",
            dir.join("out").display()
        );
        let path = dir.join("target.yaml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_skipped_stage_failure_exits_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &server.uri());
        let loader = ConfigLoader::new(dir.path().to_path_buf());

        let outcome = run(&loader, "target_chembl", Some(path), None, RunOptions::dry_run(), false).await;

        let err = outcome.as_ref().unwrap_err();
        assert!(matches!(err, EtlError::Incomplete { .. }), "{err:?}");
        assert_eq!(err.exit_code(), 1);
        assert_eq!(exit_status(&outcome), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_status(&Ok(())), 0);
        assert_eq!(exit_status(&Err(EtlError::config("bad"))), 2);
        assert_eq!(exit_status(&Err(EtlError::Cancelled("stop".into()))), 130);
    }
}
