//! FinServe - Main Entry Point
//!
//! Parses flags, loads the model artifact once, and runs the prediction
//! server until a shutdown signal arrives. Any startup failure exits
//! non-zero before the listening socket is created.

use clap::error::ErrorKind;
use clap::Parser;
use finserve_common::{FinserveError, Result};
use finserve_server::cli::Cli;
use finserve_server::engine::InferenceEngine;
use finserve_server::model::{MlpModel, Model};
use finserve_server::server::PredictionServer;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            // clap renders the cause plus usage.
            eprint!("{}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;

    let level = config.observability.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("finserve_server={},finserve_common={}", level, level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting FinServe prediction server");

    let model = MlpModel::load(&config.model_path)?;
    info!(
        "Model ready: input size {}, outputs {:?}",
        model.input_size(),
        model.output_names()
    );

    let engine = InferenceEngine::new(Arc::new(model));
    let server = PredictionServer::bind(&config, engine)?;
    let shutdown = server.shutdown_handle();

    info!(
        "Serving model {} on {}:{}",
        config.model_path.display(),
        config.bind_address,
        config.port
    );

    let mut server_task = tokio::spawn(server.serve());
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        result = &mut server_task => {
            // The accept loop exited without a signal; surface its outcome.
            return result.map_err(|e| FinserveError::Internal(e.to_string()))?;
        }
    }

    shutdown.stop();
    server_task
        .await
        .map_err(|e| FinserveError::Internal(e.to_string()))??;

    info!("FinServe shutdown complete");
    Ok(())
}
