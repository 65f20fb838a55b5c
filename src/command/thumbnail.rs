use crate::common::*;

use std::str::FromStr;

use super::collect_ids;
use crate::pool::map_progress;
use crate::storage::{
    Credentials,
    S3Storage,
};
use crate::thumbnail::Thumbnails;

#[derive(StructOpt, Debug)]
pub struct ThumbnailOptions {
    /// Pool id, used as the folder in the bucket
    #[structopt(name = "POOL_ID")]
    pool_id: String,
    /// Attachment ids
    #[structopt(name = "ATTACHMENT")]
    attachments: Vec<String>,
    /// File with more attachment ids, one per line
    #[structopt(short = "i", long = "input", parse(from_os_str))]
    input: Option<PathBuf>,
    /// Bounding box, e.g., `1000` or `1280x720`. Defaults to the configured
    /// `thumbnail.max_size`.
    #[structopt(long = "size")]
    size: Option<SizeParam>,
    /// Only render thumbnails locally
    #[structopt(long = "no-upload")]
    no_upload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SizeParam(u32, u32);

impl FromStr for SizeParam {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let re = regex::Regex::new(r"^(?P<w>\d+)(?:x(?P<h>\d+))?$")?;
        let caps = re
            .captures(s.trim())
            .with_context(|| format!("Expected `SIZE` or `WIDTHxHEIGHT`, got {:?}", s))?;

        let width: u32 = caps["w"].parse()?;
        let height: u32 = match caps.name("h") {
            Some(h) => h.as_str().parse()?,
            None => width,
        };
        anyhow::ensure!(width > 0 && height > 0, "Thumbnail size must be positive");

        Ok(SizeParam(width, height))
    }
}

pub struct ThumbnailCommand;

impl CommandType for ThumbnailCommand {
    type Options = ThumbnailOptions;

    fn run(opt: &Options, config: &Config, th_opt: &Self::Options) -> Result<()> {
        let attachments = collect_ids(&th_opt.attachments, th_opt.input.as_deref())?;
        std::fs::create_dir_all(&config.paths.thumbnails).with_context(|| {
            format!("Failed to create {}", config.paths.thumbnails.display())
        })?;

        let max_size = th_opt
            .size
            .map(|SizeParam(w, h)| (w, h))
            .unwrap_or((config.thumbnail.max_size, config.thumbnail.max_size));
        let storage = S3Storage::new(
            config.storage.clone(),
            Credentials::from_env(|name| std::env::var(name).ok()),
        )?;
        let thumbnails = Arc::new(Thumbnails {
            images_dir: config.paths.images.clone(),
            thumbnails_dir: config.paths.thumbnails.clone(),
            max_size,
            quality: config.thumbnail.quality,
            storage,
        });

        let pool = crate::pool::create(opt.threads)?;
        let started = Instant::now();
        let pool_id = Arc::new(th_opt.pool_id.clone());
        let no_upload = th_opt.no_upload;

        let results = map_progress(&pool, attachments.clone(), move |attachment: String| {
            let location = if no_upload {
                thumbnails
                    .make_thumbnail(&attachment)
                    .map(|path| path.display().to_string())
            } else {
                thumbnails.make_upload_thumbnail(&pool_id, &attachment)
            };
            location.with_context(|| format!("Failed to process attachment {}", attachment))
        })?;

        for (attachment, location) in attachments.iter().zip(results.iter()) {
            println!("{}\t{}", attachment, location);
        }

        tracing::info!(
            "Processed {} thumbnails in {}",
            results.len(),
            HumanDuration(started.elapsed())
        );

        Ok(())
    }
}
