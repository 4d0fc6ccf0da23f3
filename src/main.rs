//! huectl - apply Hue scenes from the terminal
//!
//! Finds the bridge, resolves room and scene names through a local cache,
//! and either recalls a scene or switches a room off.

mod api;
mod cache;
mod cli;
mod commands;
mod config;
mod discovery;
mod error;
mod executor;
mod resolver;
#[cfg(test)]
mod test_support;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;
use crate::config::RuntimeContext;

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(io::stderr(), "Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(&cli.global)?;
    ctx.init_logging()?;

    log::debug!("Config loaded from: {:?}", ctx.config_path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(commands::action::run(&ctx, &cli))
}
