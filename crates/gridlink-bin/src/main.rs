// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! GRIDLINK gateway entry point.

use std::process::ExitCode;

use gridlink_bin::cli::{Cli, Commands};
use gridlink_bin::config::BootConfig;
use gridlink_bin::logging::init_logging;
use gridlink_bin::runtime::GatewayRuntime;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(&cli.log_level, cli.log_format);

    let config = match BootConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.effective_command() {
        Commands::Run(_args) => {
            let runtime = GatewayRuntime::new(config);
            match runtime.run().await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    tracing::error!(error = %err, "gateway failed");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Validate => {
            let runtime = GatewayRuntime::new(config);
            match runtime.validate() {
                Ok(()) => {
                    println!("configuration ok");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("configuration invalid: {}", err);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Version => {
            println!("gridlink {}", gridlink_core::VERSION);
            ExitCode::SUCCESS
        }
    }
}
