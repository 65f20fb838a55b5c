//! Content and perceptual hashes of images.
//!
//! The perceptual hashes are 8x8 bit grids rendered as 16 hex characters,
//! packed row-major with the most significant bit first:
//!
//! - `dhash`: each pixel of a 9x8 grayscale thumbnail compared with its left
//!   neighbour.
//! - `phash`: low-frequency 8x8 block of the 2-D DCT of a 32x32 thumbnail,
//!   compared with its median.
//! - `whash`: Haar approximation of a power-of-two thumbnail down to 8x8, with
//!   the image mean removed, compared with its median.

use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;
use image::{
    imageops::FilterType,
    DynamicImage,
    GenericImageView,
    GrayImage,
    Luma,
};
use md5::{
    Digest,
    Md5,
};
use serde_derive::Serialize;

const HASH_SIZE: u32 = 8;
const PHASH_HIGHFREQ_FACTOR: u32 = 4;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PerceptualHashes {
    pub dhash: String,
    pub phash: String,
    pub whash: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageHashes {
    #[serde(flatten)]
    pub perceptual: PerceptualHashes,
    pub md5: String,
}

pub(crate) fn calculate_phashes(image: &DynamicImage) -> anyhow::Result<PerceptualHashes> {
    let (width, height) = image.dimensions();
    anyhow::ensure!(
        width > 0 && height > 0,
        "Cannot hash an empty image ({}x{})",
        width,
        height
    );
    let gray = to_gray(image);

    Ok(PerceptualHashes {
        dhash: bits_to_hex(&dhash_bits(&gray)),
        phash: bits_to_hex(&phash_bits(&gray)),
        whash: bits_to_hex(&whash_bits(&gray)),
    })
}

pub(crate) fn calculate_hashes(image_bytes: &[u8]) -> anyhow::Result<ImageHashes> {
    let image = image::load_from_memory(image_bytes).context("Failed to decode image")?;
    let perceptual = calculate_phashes(&image)?;
    let md5 = hex::encode(Md5::digest(image_bytes));

    Ok(ImageHashes { perceptual, md5 })
}

pub(crate) fn read_and_calculate_hashes(filename: &Path) -> anyhow::Result<(PathBuf, ImageHashes)> {
    let content = std::fs::read(filename)
        .with_context(|| format!("Failed to read {}", filename.display()))?;
    let hashes = calculate_hashes(&content)
        .with_context(|| format!("Failed to hash {}", filename.display()))?;

    Ok((filename.to_owned(), hashes))
}

/// Number of differing bits between two hex hashes of equal length.
pub(crate) fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }

    a.chars().zip(b.chars()).try_fold(0, |acc, (x, y)| {
        let x = x.to_digit(16)?;
        let y = y.to_digit(16)?;
        Some(acc + (x ^ y).count_ones())
    })
}

/// ITU-R 601 luma with the same fixed-point rounding PIL uses for mode "L".
fn to_gray(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

fn resize(gray: &GrayImage, width: u32, height: u32) -> GrayImage {
    if gray.dimensions() == (width, height) {
        gray.clone()
    } else {
        image::imageops::resize(gray, width, height, FilterType::Lanczos3)
    }
}

fn dhash_bits(gray: &GrayImage) -> Vec<bool> {
    let small = resize(gray, HASH_SIZE + 1, HASH_SIZE);
    let mut bits = Vec::with_capacity((HASH_SIZE * HASH_SIZE) as usize);
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            bits.push(small.get_pixel(x + 1, y).0[0] > small.get_pixel(x, y).0[0]);
        }
    }

    bits
}

fn phash_bits(gray: &GrayImage) -> Vec<bool> {
    let img_size = HASH_SIZE * PHASH_HIGHFREQ_FACTOR;
    let n = img_size as usize;
    let small = resize(gray, img_size, img_size);

    let mut pixels: Vec<Vec<f64>> = (0..img_size)
        .map(|y| (0..img_size).map(|x| f64::from(small.get_pixel(x, y).0[0])).collect())
        .collect();

    // Along columns, then along rows.
    for x in 0..n {
        let column: Vec<f64> = pixels.iter().map(|row| row[x]).collect();
        for (row, value) in pixels.iter_mut().zip(dct(&column)) {
            row[x] = value;
        }
    }
    for row in pixels.iter_mut() {
        *row = dct(row);
    }

    let low_freq: Vec<f64> = pixels
        .iter()
        .take(HASH_SIZE as usize)
        .flat_map(|row| row.iter().take(HASH_SIZE as usize).cloned())
        .collect();
    above_median(&low_freq)
}

fn whash_bits(gray: &GrayImage) -> Vec<bool> {
    let min_dim = gray.width().min(gray.height());
    let image_scale = std::cmp::max(1u32 << floor_log2(min_dim), HASH_SIZE);
    let small = resize(gray, image_scale, image_scale);

    let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0]) / 255.).collect();

    // The deepest Haar LL coefficient of a square power-of-two image is its
    // mean; zeroing it and reconstructing leaves the mean-free image.
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;

    // Each further Haar level halves the approximation grid, so the
    // approximation at the remaining depth is a grid of block averages up to
    // a constant factor, which the median comparison ignores.
    let block = (image_scale / HASH_SIZE) as usize;
    let scale = image_scale as usize;
    let mut low = Vec::with_capacity((HASH_SIZE * HASH_SIZE) as usize);
    for by in 0..HASH_SIZE as usize {
        for bx in 0..HASH_SIZE as usize {
            let mut sum = 0.;
            for y in by * block..(by + 1) * block {
                for x in bx * block..(bx + 1) * block {
                    sum += pixels[y * scale + x] - mean;
                }
            }
            low.push(sum / (block * block) as f64);
        }
    }

    above_median(&low)
}

fn floor_log2(n: u32) -> u32 {
    31 - n.leading_zeros()
}

/// Unnormalized type-II DCT.
fn dct(input: &[f64]) -> Vec<f64> {
    let n = input.len() as f64;
    (0..input.len())
        .map(|k| {
            2. * input
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    x * (std::f64::consts::PI * k as f64 * (2. * i as f64 + 1.) / (2. * n)).cos()
                })
                .sum::<f64>()
        })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.
    } else {
        sorted[mid]
    }
}

fn above_median(values: &[f64]) -> Vec<bool> {
    let med = median(values);
    values.iter().map(|&v| v > med).collect()
}

fn bits_to_hex(bits: &[bool]) -> String {
    let pad = (4 - bits.len() % 4) % 4;
    let padded: Vec<bool> = std::iter::repeat(false).take(pad).chain(bits.iter().cloned()).collect();

    padded
        .chunks(4)
        .map(|nibble| {
            let value = nibble.iter().fold(0u32, |acc, &b| (acc << 1) | u32::from(b));
            std::char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}
