use crate::common::*;

use itertools::Itertools;
use prettytable::Table;
use serde_derive::Serialize;

use super::OutputFormat;
use crate::hash::{
    hamming_distance,
    read_and_calculate_hashes,
    ImageHashes,
};
use crate::pool::map_progress;

#[derive(StructOpt, Debug)]
pub struct HashOptions {
    /// Image files to hash
    #[structopt(name = "FILE", parse(from_os_str), required = true)]
    files: Vec<PathBuf>,
    /// Output format, `table` or `json`
    #[structopt(long = "format", default_value = "table")]
    format: OutputFormat,
    /// Also list pairs of files whose phashes differ by at most this many bits
    #[structopt(long = "max-distance")]
    max_distance: Option<u32>,
}

#[derive(Serialize, Debug)]
struct FileHashes<'a> {
    file: String,
    #[serde(flatten)]
    hashes: &'a ImageHashes,
}

#[derive(Serialize, Debug, PartialEq)]
struct SimilarPair {
    first: String,
    second: String,
    distance: u32,
}

pub struct HashCommand;

impl CommandType for HashCommand {
    type Options = HashOptions;

    fn run(opt: &Options, _config: &Config, hash_opt: &Self::Options) -> Result<()> {
        let pool = crate::pool::create(opt.threads)?;
        let started = Instant::now();

        let results = map_progress(&pool, hash_opt.files.clone(), |file: PathBuf| {
            read_and_calculate_hashes(&file)
        })?;
        let similar = hash_opt
            .max_distance
            .map(|max| similar_pairs(&results, max))
            .unwrap_or_default();

        match hash_opt.format {
            OutputFormat::Json => {
                let files: Vec<FileHashes> = results
                    .iter()
                    .map(|(file, hashes)| FileHashes {
                        file: file.display().to_string(),
                        hashes,
                    })
                    .collect();
                let json = match hash_opt.max_distance {
                    Some(_) => serde_json::json!({ "files": files, "similar": similar }),
                    None => serde_json::to_value(&files)?,
                };
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Table => {
                print_hashes(&results);
                if hash_opt.max_distance.is_some() {
                    print_similar(&similar);
                }
            }
        }

        tracing::info!(
            "Hashed {} files in {}",
            results.len(),
            HumanDuration(started.elapsed())
        );

        Ok(())
    }
}

/// Pairs, in input order, whose phash Hamming distance is at most `max`.
fn similar_pairs(results: &[(PathBuf, ImageHashes)], max: u32) -> Vec<SimilarPair> {
    results
        .iter()
        .tuple_combinations()
        .filter_map(|((a, ha), (b, hb))| {
            let distance = hamming_distance(&ha.perceptual.phash, &hb.perceptual.phash)?;
            if distance <= max {
                Some(SimilarPair {
                    first: a.display().to_string(),
                    second: b.display().to_string(),
                    distance,
                })
            } else {
                None
            }
        })
        .collect()
}

fn print_hashes(results: &[(PathBuf, ImageHashes)]) {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_CLEAN);
    table.set_titles(row!["File", "dhash", "phash", "whash", "md5"]);

    for (file, h) in results {
        table.add_row(row![
            file.display(),
            h.perceptual.dhash,
            h.perceptual.phash,
            h.perceptual.whash,
            h.md5,
        ]);
    }

    table.printstd();
}

fn print_similar(similar: &[SimilarPair]) {
    if similar.is_empty() {
        println!("No similar pairs");
        return;
    }

    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_CLEAN);
    table.set_titles(row!["File", "File", r -> "Distance"]);
    for pair in similar {
        table.add_row(row![pair.first, pair.second, r -> pair.distance]);
    }

    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::hash::PerceptualHashes;

    fn hashes(phash: &str) -> ImageHashes {
        ImageHashes {
            perceptual: PerceptualHashes {
                dhash: String::new(),
                phash: phash.to_owned(),
                whash: String::new(),
            },
            md5: String::new(),
        }
    }

    #[test]
    fn finds_near_duplicates_in_order() {
        let results = vec![
            (PathBuf::from("a.jpg"), hashes("ff00")),
            (PathBuf::from("b.jpg"), hashes("00ff")),
            (PathBuf::from("c.jpg"), hashes("ff01")),
            (PathBuf::from("d.jpg"), hashes("ff00")),
        ];

        let pairs = similar_pairs(&results, 1);
        let names: Vec<(&str, &str, u32)> = pairs
            .iter()
            .map(|p| (p.first.as_str(), p.second.as_str(), p.distance))
            .collect();
        assert_eq!(
            names,
            vec![("a.jpg", "c.jpg", 1), ("a.jpg", "d.jpg", 0), ("c.jpg", "d.jpg", 1)]
        );

        assert!(similar_pairs(&results, 0).iter().all(|p| p.distance == 0));
    }
}
