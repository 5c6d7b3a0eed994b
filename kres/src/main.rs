// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

mod cli;
mod commands;

use std::sync::Arc;
use std::process;
use clap::Parser;
use clap::CommandFactory;
use rustls::crypto::aws_lc_rs;

use kres_common::config::{AppConfig, AppConfigBuilder};
use kres_common::constant::APP_NAME;
use kres_common::state::State;
use kres_common::telemetry::{error, info, setup_logging};
use kres_controller::controller::context::Context;
use kres_controller::store::MemoryStore;

use crate::cli::{CliArgs, Commands};

fn load_config(args: &CliArgs) -> AppConfig {
    let mut builder = AppConfigBuilder::default();
    if let Some(path) = &args.config {
        builder.with_file(path);
    }

    builder
        .with_env()
        .with_override_option("provider.field_manager", args.field_manager.clone())
        .with_override_option("provider.force_conflicts", args.force_conflicts.then_some(true))
        .build()
        .unwrap_or_else(|e| {
            error!(
                event = "Error",
                error = %e,
            );
            process::exit(1);
        })
}

async fn connect(state: Arc<State>) -> Context {
    info!(
        event = "Starting",
        app = APP_NAME,
        version = env!("CARGO_PKG_VERSION"),
    );

    Context::from_cluster(state).await.unwrap_or_else(|e| {
        error!(
            event = "Error",
            error = %e,
        );
        process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    // Install the default aws_lc_rs crypto provider
    let _ = aws_lc_rs::default_provider().install_default();

    let args = CliArgs::parse();

    setup_logging();

    let Some(cmd) = &args.cmd else {
        let mut cmd = CliArgs::command();
        let _ = cmd.print_help();
        process::exit(1);
    };

    let config = load_config(&args);
    let state = Arc::new(State { config });

    let result = match cmd {
        Commands::Kinds => {
            commands::kinds(&Context::new(MemoryStore::new(), state));
            Ok(())
        },
        Commands::Schema => commands::schema(),
        Commands::Render(render) => commands::render(&Context::new(MemoryStore::new(), state), render),
        Commands::Get(get) => commands::get(&connect(state).await, get).await,
        Commands::Apply(apply) => commands::apply(&connect(state).await, apply).await,
        Commands::Delete(delete) => commands::delete(&connect(state).await, delete).await,
        Commands::Import(import) => commands::import(&connect(state).await, import).await,
    };

    if let Err(e) = result {
        error!(
            event = "Error",
            error = format!("{:#}", e).as_str(),
        );
        process::exit(1);
    }
}
