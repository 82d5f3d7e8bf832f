//! alcaldia-load - bulk loader entry point
//!
//! Exit codes: 0 when every selected task succeeded, 1 when at least one
//! task failed, 2 when nothing could be loaded (configuration, unknown data
//! type, database connection, schema) or the command line was invalid.

use std::process::ExitCode;

use alcaldia_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use alcaldia_etl::app;
use alcaldia_etl::cli::Cli;
use alcaldia_etl::EtlResult;
use clap::Parser;
use tracing::error;

const EXIT_TASK_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

fn log_config(verbose: bool) -> LogConfig {
    LogConfig::builder()
        .level(if verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("alcaldia-load")
        .build()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Environment variables take precedence over the flags
    let log_config = log_config(cli.verbose).with_env_overrides().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring invalid logging configuration: {:#}", e);
        log_config(cli.verbose)
    });
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Load aborted");
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_FATAL)
        },
    }
}

async fn execute(cli: &Cli) -> EtlResult<ExitCode> {
    app::check_registry()?;

    if cli.list_data_types {
        println!("{}", app::render_data_types(cli.format)?);
        return Ok(ExitCode::SUCCESS);
    }

    // clap requires --data-type unless listing; an empty value is reported
    // as an unknown data type
    let data_type = cli.data_type.as_deref().unwrap_or_default();
    let (config, selection) = app::resolve(data_type)?;

    if cli.dry_run {
        let tasks = app::plan(&config, &selection)?;
        println!("{}", app::render_plan(&tasks, cli.format)?);
        return Ok(ExitCode::SUCCESS);
    }

    let run = app::load(&config, &selection).await?;
    println!("{}", app::render_run(&run, cli.format)?);

    if run.has_failures() {
        Ok(ExitCode::from(EXIT_TASK_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
