use crate::common::*;

use prettytable::Table;
use serde::ser::{
    Serialize,
    Serializer,
};

use super::{
    collect_ids,
    OutputFormat,
};
use crate::api::ApiClient;
use crate::download::download_image_and_calc_hashes;
use crate::hash::ImageHashes;
use crate::pool::map_progress;

#[derive(StructOpt, Debug)]
pub struct DownloadOptions {
    /// Attachment ids
    #[structopt(name = "ATTACHMENT")]
    attachments: Vec<String>,
    /// File with more attachment ids, one per line
    #[structopt(short = "i", long = "input", parse(from_os_str))]
    input: Option<PathBuf>,
    /// Write the hashes as JSON to this file instead of printing them
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,
    /// Output format for stdout, `table` or `json`
    #[structopt(long = "format", default_value = "table")]
    format: OutputFormat,
}

/// Serializes as a JSON object from attachment id to its hashes, or `null`
/// for a failed attachment, keeping input order.
struct HashesById<'a>(&'a [(String, Option<ImageHashes>)]);

impl Serialize for HashesById<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(attachment, hashes)| (attachment, hashes)))
    }
}

pub struct DownloadCommand;

impl CommandType for DownloadCommand {
    type Options = DownloadOptions;

    fn run(opt: &Options, config: &Config, dl_opt: &Self::Options) -> Result<()> {
        let attachments = collect_ids(&dl_opt.attachments, dl_opt.input.as_deref())?;
        let images_dir = config.paths.images.clone();
        std::fs::create_dir_all(&images_dir)
            .with_context(|| format!("Failed to create {}", images_dir.display()))?;

        let client = Arc::new(ApiClient::new(&config.api)?);
        let pool = crate::pool::create(opt.threads)?;
        let started = Instant::now();

        let results = map_progress(&pool, attachments, move |attachment: String| {
            Ok(download_image_and_calc_hashes(&client, &images_dir, &attachment))
        })?;

        let failed = results.iter().filter(|(_, hashes)| hashes.is_none()).count();
        let by_id = HashesById(&results);

        match (&dl_opt.output, dl_opt.format) {
            (Some(output), _) => {
                let json = serde_json::to_string_pretty(&by_id)?;
                std::fs::write(output, json)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                tracing::info!("Wrote hashes to {}", output.display());
            }
            (None, OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(&by_id)?),
            (None, OutputFormat::Table) => print_table(&results),
        }

        tracing::info!(
            "Processed {} attachments ({} failed) in {}",
            results.len(),
            failed,
            HumanDuration(started.elapsed())
        );

        Ok(())
    }
}

fn print_table(results: &[(String, Option<ImageHashes>)]) {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_CLEAN);
    table.set_titles(row!["Attachment", "dhash", "phash", "whash", "md5"]);

    for (attachment, hashes) in results {
        match hashes {
            Some(h) => table.add_row(row![
                attachment,
                h.perceptual.dhash,
                h.perceptual.phash,
                h.perceptual.whash,
                h.md5,
            ]),
            None => table.add_row(row![attachment, "-", "-", "-", "-"]),
        };
    }

    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::hash::PerceptualHashes;

    fn hashes(hex: &str) -> ImageHashes {
        ImageHashes {
            perceptual: PerceptualHashes {
                dhash: hex.to_owned(),
                phash: hex.to_owned(),
                whash: hex.to_owned(),
            },
            md5: "d41d8cd98f00b204e9800998ecf8427e".to_owned(),
        }
    }

    #[test]
    fn json_maps_ids_to_hashes_or_null() {
        let results = vec![
            ("b2".to_owned(), Some(hashes("00000000ffffffff"))),
            ("a1".to_owned(), None),
        ];
        let json = serde_json::to_string(&HashesById(&results)).unwrap();

        // Input order is kept.
        assert!(json.find("\"b2\"").unwrap() < json.find("\"a1\"").unwrap());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "b2": {
                    "dhash": "00000000ffffffff",
                    "phash": "00000000ffffffff",
                    "whash": "00000000ffffffff",
                    "md5": "d41d8cd98f00b204e9800998ecf8427e",
                },
                "a1": null,
            })
        );
    }
}
