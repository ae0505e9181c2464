/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/main.rs
 * Entry point of the `runner-fleet` binary. Parses arguments, loads the
 * configuration, wires the real collaborators and runs the chosen driver.
 * Any failure is reported as a single ERROR line and exit status 1.
 * SPDX-License-Identifier: Apache-2.0 */

use anyhow::{Context, Result};
use clap::Parser;
use runner_fleet::cli::{Cli, Commands};
use runner_fleet::config::Settings;
use runner_fleet::provisioners::LocalBackends;
use runner_fleet::setup::run_setup;
use runner_fleet::teardown::{run_teardown, TeardownPlan};
use runner_fleet::telemetry;
use std::process::ExitCode;
use tracing::error;

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup(args) => {
            let settings = Settings::load(&args.config)
                .with_context(|| format!("Failed to load {}", args.config.display()))?;
            let backends = LocalBackends::new(&settings);
            run_setup(&settings, backends.backends())
                .await
                .context("Setup failed")?;
        }
        Commands::Teardown(args) => {
            let settings = match &args.config {
                Some(path) => Settings::load(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => Settings::default(),
            };
            let plan = TeardownPlan::from_options(&args.options());
            let backends = LocalBackends::new(&settings);
            run_teardown(&settings, &plan, backends.backends())
                .await
                .context("Teardown failed")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are successful exits; usage errors are not.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    telemetry::init_logging();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
