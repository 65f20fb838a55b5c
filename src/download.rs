use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;

use crate::api::ApiClient;
use crate::error::Error;
use crate::hash::{
    calculate_hashes,
    read_and_calculate_hashes,
    ImageHashes,
};

/// Local path of an attachment under `dir`. Ids are used as file names, so
/// anything that could escape `dir` is refused.
pub(crate) fn attachment_path(dir: &Path, attachment: &str) -> Result<PathBuf, Error> {
    let valid = !attachment.is_empty()
        && attachment != "."
        && attachment != ".."
        && attachment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid {
        return Err(Error::AttachmentId(attachment.to_owned()));
    }

    Ok(dir.join(attachment))
}

/// Fetch an attachment into `images_dir` unless it is already there, and hash
/// it. Failures are logged and reported as `None` so a batch can carry on.
pub(crate) fn download_image_and_calc_hashes(
    client: &ApiClient,
    images_dir: &Path,
    attachment: &str,
) -> (String, Option<ImageHashes>) {
    match fetch_and_hash(client, images_dir, attachment) {
        Ok(hashes) => (attachment.to_owned(), Some(hashes)),
        Err(e) => {
            tracing::error!(attachment, "{:#}", e);
            (attachment.to_owned(), None)
        }
    }
}

fn fetch_and_hash(client: &ApiClient, images_dir: &Path, attachment: &str) -> anyhow::Result<ImageHashes> {
    let filename = attachment_path(images_dir, attachment)?;

    if filename.exists() {
        tracing::info!("{} already exists", filename.display());
        let (_, hashes) = read_and_calculate_hashes(&filename)?;
        return Ok(hashes);
    }

    tracing::info!("downloading {}...", filename.display());
    let content = client.download_attachment(attachment)?;

    // Hash before writing so that a response that is not an image is never
    // cached.
    let hashes = calculate_hashes(&content)
        .with_context(|| format!("Attachment {} is not a readable image", attachment))?;
    std::fs::write(&filename, &content)
        .with_context(|| format!("Failed to write {}", filename.display()))?;

    Ok(hashes)
}
