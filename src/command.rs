use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use itertools::Itertools;
use serde_derive::Deserialize;
use structopt::StructOpt;

use super::Options;
use crate::config::Config;

mod api;
mod download;
mod hash;
mod thumbnail;
mod verdict;

#[derive(StructOpt, Debug)]
pub(super) enum Command {
    /// Download attachments into the images directory and hash them.
    /// Attachments already on disk are hashed without downloading.
    #[structopt(name = "download")]
    Download(download::DownloadOptions),
    /// Compute content and perceptual hashes of local image files.
    #[structopt(name = "hash")]
    Hash(hash::HashOptions),
    /// Render thumbnails of downloaded attachments and upload them to the
    /// pool's folder in object storage.
    #[structopt(name = "thumbnail")]
    Thumbnail(thumbnail::ThumbnailOptions),
    /// Accept assignments with the standard comment.
    #[structopt(name = "accept")]
    Accept(verdict::AcceptOptions),
    /// Reject assignments with a public comment.
    #[structopt(name = "reject")]
    Reject(verdict::RejectOptions),
    /// Set an assignment's status to `accepted` or `rejected`.
    #[structopt(name = "verdict")]
    Verdict(verdict::VerdictOptions),
    /// Send a raw request to the labeling API and print the response body.
    #[structopt(name = "api")]
    Api(api::ApiOptions),
}

pub(crate) trait CommandType {
    type Options: StructOpt;

    fn run(opt: &Options, config: &Config, com_opt: &Self::Options) -> Result<()>;
}

pub(super) fn dispatch(opt: &Options, config: &Config) -> Result<()> {
    #[rustfmt::skip]
    match opt.command {
        Command::Download(ref dl_opt) =>
            download::DownloadCommand::run(opt, config, dl_opt)?,
        Command::Hash(ref hash_opt) =>
            hash::HashCommand::run(opt, config, hash_opt)?,
        Command::Thumbnail(ref th_opt) =>
            thumbnail::ThumbnailCommand::run(opt, config, th_opt)?,
        Command::Accept(ref acc_opt) =>
            verdict::AcceptCommand::run(opt, config, acc_opt)?,
        Command::Reject(ref rej_opt) =>
            verdict::RejectCommand::run(opt, config, rej_opt)?,
        Command::Verdict(ref v_opt) =>
            verdict::VerdictCommand::run(opt, config, v_opt)?,
        Command::Api(ref api_opt) =>
            api::ApiCommand::run(opt, config, api_opt)?,
    };

    Ok(())
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

serde_plain::derive_fromstr_from_deserialize!(OutputFormat);

/// Ids given on the command line followed by those in `input` (one per line,
/// blank lines and `#` comments skipped), without repeats.
pub(crate) fn collect_ids(args: &[String], input: Option<&Path>) -> Result<Vec<String>> {
    let mut ids = args.to_vec();

    if let Some(input) = input {
        let content = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read id list: {}", input.display()))?;
        ids.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_owned),
        );
    }

    let ids: Vec<String> = ids.into_iter().unique().collect();
    anyhow::ensure!(!ids.is_empty(), "No ids given");

    Ok(ids)
}
