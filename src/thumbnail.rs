use std::fs::File;
use std::io::BufWriter;
use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;
use image::{
    codecs::jpeg::JpegEncoder,
    imageops::FilterType,
    DynamicImage,
    GenericImageView,
    ImageDecoder,
    ImageReader,
    RgbImage,
};

use crate::download::attachment_path;
use crate::storage::S3Storage;

/// Renders thumbnails of downloaded attachments and publishes them.
pub(crate) struct Thumbnails {
    pub images_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    /// Bounding box, `(width, height)`.
    pub max_size: (u32, u32),
    pub quality: u8,
    pub storage: S3Storage,
}

impl Thumbnails {
    pub(crate) fn thumbnail_path(&self, attachment: &str) -> anyhow::Result<PathBuf> {
        attachment_path(&self.thumbnails_dir, attachment)?;
        Ok(self.thumbnails_dir.join(format!("{}.jpg", attachment)))
    }

    pub(crate) fn object_key(pool_id: &str, attachment: &str) -> String {
        format!("{}/thumbnails/{}.jpg", pool_id, attachment)
    }

    pub(crate) fn make_thumbnail(&self, attachment: &str) -> anyhow::Result<PathBuf> {
        let source = attachment_path(&self.images_dir, attachment)?;
        let output = self.thumbnail_path(attachment)?;

        let thumbnail = render_thumbnail(&source, self.max_size)?;
        save_jpeg(&thumbnail, &output, self.quality)?;
        tracing::info!("saved a thumbnail to {}", output.display());

        Ok(output)
    }

    pub(crate) fn upload_thumbnail(&self, pool_id: &str, attachment: &str) -> anyhow::Result<String> {
        let thumbnail_path = self.thumbnail_path(attachment)?;
        let key = Self::object_key(pool_id, attachment);

        let body = std::fs::read(&thumbnail_path)
            .with_context(|| format!("Failed to read {}", thumbnail_path.display()))?;
        self.storage
            .put_object(&key, body, "image/jpeg")
            .with_context(|| format!("Failed to upload {}", key))?;
        tracing::debug!(%key, "uploaded");

        self.storage.public_url(&key)
    }

    /// A thumbnail already present locally is taken to be published already.
    pub(crate) fn make_upload_thumbnail(&self, pool_id: &str, attachment: &str) -> anyhow::Result<String> {
        if self.thumbnail_path(attachment)?.exists() {
            return self.storage.public_url(&Self::object_key(pool_id, attachment));
        }

        self.make_thumbnail(attachment)?;
        self.upload_thumbnail(pool_id, attachment)
    }
}

pub(crate) fn render_thumbnail(source: &Path, max_size: (u32, u32)) -> anyhow::Result<RgbImage> {
    let mut decoder = ImageReader::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?
        .with_guessed_format()?
        .into_decoder()
        .with_context(|| format!("Unsupported image {}", source.display()))?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    let (width, height) = image.dimensions();
    let (new_width, new_height) = fit_within((width, height), max_size);
    if (new_width, new_height) != (width, height) {
        image = image.resize_exact(new_width, new_height, FilterType::Triangle);
    }

    Ok(image.to_rgb8())
}

/// Largest size with the same aspect ratio that fits in `bounds`. Never
/// enlarges.
pub(crate) fn fit_within(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (width, height) = size;
    let (max_width, max_height) = bounds;
    if width <= max_width && height <= max_height {
        return size;
    }

    let aspect = f64::from(width) / f64::from(height);
    if f64::from(max_width) / f64::from(max_height) >= aspect {
        let new_width = round_aspect(f64::from(max_height) * aspect, |n| {
            (aspect - n / f64::from(max_height)).abs()
        });
        (new_width, max_height)
    } else {
        let new_height = round_aspect(f64::from(max_width) / aspect, |n| {
            if n == 0. {
                0.
            } else {
                (aspect - f64::from(max_width) / n).abs()
            }
        });
        (max_width, new_height)
    }
}

/// Floor or ceiling of `number`, whichever keeps the aspect ratio closer.
fn round_aspect(number: f64, error: impl Fn(f64) -> f64) -> u32 {
    let floor = number.floor();
    let ceil = number.ceil();
    let best = if error(ceil) < error(floor) { ceil } else { floor };

    std::cmp::max(best as u32, 1)
}

fn save_jpeg(image: &RgbImage, output: &Path, quality: u8) -> anyhow::Result<()> {
    // Write aside and rename, so an interrupted run never leaves a truncated
    // thumbnail that would later pass for a finished one.
    let partial = output.with_extension("part");
    {
        let file = File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, quality).encode_image(image)?;
        std::io::Write::flush(&mut writer)?;
    }
    std::fs::rename(&partial, output)
        .with_context(|| format!("Failed to move thumbnail into {}", output.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::ImageFormat;

    use crate::config::StorageConfig;
    use crate::error::Error;
    use crate::storage::ACCESS_KEY_ENV;

    fn thumbnails(dir: &Path, max_size: (u32, u32)) -> Thumbnails {
        let images_dir = dir.join("images");
        let thumbnails_dir = dir.join("thumbnails");
        std::fs::create_dir_all(&images_dir).unwrap();
        std::fs::create_dir_all(&thumbnails_dir).unwrap();

        Thumbnails {
            images_dir,
            thumbnails_dir,
            max_size,
            quality: 95,
            storage: S3Storage::new(
                StorageConfig::default(),
                Err(Error::MissingCredentials(ACCESS_KEY_ENV)),
            )
            .unwrap(),
        }
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
        }));
        image.save_with_format(path, ImageFormat::Png).unwrap();
    }

    #[test]
    fn fits_like_a_thumbnail() {
        assert_eq!(fit_within((2000, 1000), (1000, 1000)), (1000, 500));
        assert_eq!(fit_within((1000, 3000), (1000, 1000)), (333, 1000));
        assert_eq!(fit_within((500, 400), (1000, 1000)), (500, 400));
        assert_eq!(fit_within((1000, 1000), (1000, 1000)), (1000, 1000));
        assert_eq!(fit_within((5000, 1), (1000, 1000)), (1000, 1));
        assert_eq!(fit_within((800, 600), (400, 400)), (400, 300));
    }

    #[test]
    fn thumbnail_names() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = thumbnails(dir.path(), (1000, 1000));
        assert_eq!(
            thumbs.thumbnail_path("abc").unwrap(),
            dir.path().join("thumbnails").join("abc.jpg")
        );
        assert_eq!(
            thumbs.thumbnail_path("abc.png").unwrap(),
            dir.path().join("thumbnails").join("abc.png.jpg")
        );
        assert_eq!(Thumbnails::object_key("7", "abc.png"), "7/thumbnails/abc.png.jpg");
        assert!(thumbs.thumbnail_path("../abc").is_err());
    }

    #[test]
    fn makes_rgb_jpeg_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = thumbnails(dir.path(), (100, 100));
        write_png(&thumbs.images_dir.join("big"), 300, 150);

        let output = thumbs.make_thumbnail("big").unwrap();
        assert_eq!(output, thumbs.thumbnails_dir.join("big.jpg"));
        assert!(!thumbs.thumbnails_dir.join("big.part").exists());

        let saved = image::open(&output).unwrap();
        assert_eq!(saved.dimensions(), (100, 50));
        assert_eq!(saved.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn small_images_are_not_enlarged() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("small.png"), 40, 30);
        let rendered = render_thumbnail(&dir.path().join("small.png"), (1000, 1000)).unwrap();
        assert_eq!(rendered.dimensions(), (40, 30));
    }

    #[test]
    fn existing_thumbnail_skips_render_and_upload() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = thumbnails(dir.path(), (100, 100));
        // No source image and no credentials: only the cached path can succeed.
        std::fs::write(thumbs.thumbnails_dir.join("done.jpg"), b"jpeg").unwrap();

        assert_eq!(
            thumbs.make_upload_thumbnail("99", "done").unwrap(),
            "https://toloka-kitchenware.s3.eu-west-1.amazonaws.com/99/thumbnails/done.jpg"
        );
    }

    #[test]
    fn upload_needs_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = thumbnails(dir.path(), (100, 100));
        write_png(&thumbs.images_dir.join("fresh"), 120, 120);

        let err = thumbs.make_upload_thumbnail("99", "fresh").unwrap_err();
        assert!(format!("{:#}", err).contains(ACCESS_KEY_ENV));
        // The render itself went through.
        assert!(thumbs.thumbnails_dir.join("fresh.jpg").exists());
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let thumbs = thumbnails(dir.path(), (100, 100));
        assert!(thumbs.make_thumbnail("nothing").is_err());
    }
}
