use anyhow::{Context, Result};
use clap::Parser;
use config::{Commands, Config, LogLevel};
use std::{io, str::FromStr};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, prelude::*};

mod config;
mod handoff;

fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(config.log_level()).context("init logging")?;

    match config.command() {
        Commands::Send {
            socket,
            names,
            files,
        } => handoff::send(socket, files, names).context("send file descriptors"),
        Commands::Recv { socket } => handoff::recv(socket).context("receive file descriptors"),
    }
}

fn init_logging(level: LogLevel) -> Result<()> {
    let level = LevelFilter::from_str(level.as_ref()).context("convert log level filter")?;

    // Stdout carries the summary of received descriptors.
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(io::stderr)
        .with_filter(level);
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .context("init stderr fmt layer")?;

    info!("Set log level to: {}", level);
    Ok(())
}
