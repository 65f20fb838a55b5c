#[macro_use]
extern crate prettytable;

use std::path::PathBuf;

use indicatif::{
    ProgressBar,
    ProgressDrawTarget,
    ProgressStyle,
};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

mod api;
mod command;
mod config;
mod download;
mod error;
mod hash;
mod pool;
mod storage;
mod thumbnail;

#[cfg(test)]
mod test_util;

mod common {
    pub(crate) use std::path::PathBuf;
    pub(crate) use std::sync::Arc;
    pub(crate) use std::time::Instant;

    pub(crate) use anyhow::{
        Context,
        Result,
    };
    pub(crate) use indicatif::HumanDuration;
    pub(crate) use structopt::StructOpt;

    pub(crate) use crate::command::CommandType;
    pub(crate) use crate::config::Config;
    pub(crate) use crate::Options;
}

/// Utilities for crowdsourced image-labeling pools.
#[derive(StructOpt, Debug)]
#[structopt(name = "labelgest")]
pub struct Options {
    /// Number of threads for parallel processing.
    /// By default, the number of CPU cores is used.
    #[structopt(short = "t", long = "threads")]
    threads: Option<usize>,
    /// Configuration file (TOML). By default, `labelgest.toml` is read if it
    /// exists in the working directory.
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config: Option<PathBuf>,
    /// Log at debug level.
    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
    #[structopt(subcommand)]
    command: command::Command,
}

fn main() -> anyhow::Result<()> {
    let opt = Options::from_args();
    let config = config::Config::load(opt.config.as_deref())?;

    let level = if opt.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    init_logging(level);

    command::dispatch(&opt, &config)
}

fn init_logging(level: &str) {
    // `RUST_LOG` wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("labelgest={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_progress_bar(size: u64) -> ProgressBar {
    let pbar = ProgressBar::new(size);
    pbar.set_draw_target(ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) [{eta_precise}]",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pbar.set_style(style);

    pbar
}
