/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/cli.rs
 * This file defines the command-line interface of `runner-fleet` using the
 * `clap` crate's derive API. Help text is generated from the doc comments.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::teardown::TeardownOptions;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Provisions a self-hosted GitHub Actions runner fleet on a local k3d cluster.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update the cluster, controller, credentials and scale set.
    Setup(SetupArgs),

    /// Remove what `setup` created, newest first.
    Teardown(TeardownArgs),
}

/// Arguments for the `setup` command.
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Path to the KEY=VALUE configuration file.
    #[arg(required = true)]
    pub config: PathBuf,
}

/// Arguments for the `teardown` command.
#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Leave the k3d cluster running.
    #[arg(long)]
    pub keep_cluster: bool,

    /// Leave the local registry, the runner image and the cache directories.
    #[arg(long)]
    pub keep_registry: bool,

    /// Leave the runner service account and its home directory.
    #[arg(long)]
    pub keep_user: bool,

    /// Configuration file naming the resources to remove. Defaults apply without it.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TeardownArgs {
    pub fn options(&self) -> TeardownOptions {
        TeardownOptions {
            keep_cluster: self.keep_cluster,
            keep_registry: self.keep_registry,
            keep_user: self.keep_user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_setup_requires_config() {
        let err = Cli::try_parse_from(["runner-fleet", "setup"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["runner-fleet", "setup", "fleet.env"]).unwrap();
        match cli.command {
            Commands::Setup(args) => assert_eq!(args.config, PathBuf::from("fleet.env")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_teardown_flags() {
        let cli = Cli::try_parse_from([
            "runner-fleet",
            "teardown",
            "--keep-cluster",
            "--keep-user",
            "--config",
            "fleet.env",
        ])
        .unwrap();
        let Commands::Teardown(args) = cli.command else {
            panic!("expected teardown");
        };
        assert_eq!(
            args.options(),
            TeardownOptions {
                keep_cluster: true,
                keep_registry: false,
                keep_user: true,
            }
        );
        assert_eq!(args.config, Some(PathBuf::from("fleet.env")));
    }

    #[test]
    fn test_unknown_flag_and_help() {
        let err = Cli::try_parse_from(["runner-fleet", "teardown", "--keep-everything"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);

        let help = Cli::try_parse_from(["runner-fleet", "teardown", "--help"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
    }
}
