//! Lossless-first image minification.
//!
//! PNGs are re-encoded with maximum compression and adaptive filtering,
//! JPEGs at the configured quality. Whichever of the original and the
//! re-encoded bytes is smaller is written. GIF and SVG files are copied.

use crate::build::{
    discover_with_extensions, output_path, write_output, Task, TaskContext, TaskError, TaskOutput,
};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions the images task picks up.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg"];

/// Minify every image under the images directory.
#[derive(Debug, Default)]
pub struct ImagesTask;

/// Outcome for one file.
struct Minified {
    out: PathBuf,
    before: usize,
    after: usize,
    warning: Option<String>,
}

impl Task for ImagesTask {
    fn name(&self) -> &str {
        "images"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let images = &ctx.config().images;
        let dir = ctx.src_path(&images.dir);
        let files = discover_with_extensions(&dir, IMAGE_EXTENSIONS)?;
        if files.is_empty() {
            return Ok(TaskOutput::skipped(format!("no images in {}", dir.display())));
        }

        let out_dir = ctx.out_path(&images.out);
        let quality = images.jpeg_quality;
        let results = files
            .par_iter()
            .map(|file| minify_file(file, &output_path(&dir, file, &out_dir, None), quality))
            .collect::<Result<Vec<_>, _>>()?;

        let before: usize = results.iter().map(|r| r.before).sum();
        let after: usize = results.iter().map(|r| r.after).sum();
        info!(files = results.len(), before, after, "images minified");

        let mut output = TaskOutput::files(results.iter().map(|r| r.out.clone()).collect());
        for warning in results.into_iter().filter_map(|r| r.warning) {
            output = output.with_warning(warning);
        }
        Ok(output)
    }
}

fn minify_file(file: &Path, out: &Path, quality: u8) -> Result<Minified, TaskError> {
    let original = std::fs::read(file).map_err(|e| TaskError::io(file, e))?;
    let format = match ImageFormat::from_path(file) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Some(format),
        _ => None,
    };

    let mut warning = None;
    let bytes = match format {
        Some(format) => {
            let image = image::load_from_memory_with_format(&original, format)
                .map_err(|e| TaskError::transform(file, e.to_string()))?;
            match reencode(&image, format, quality) {
                Ok(encoded) if encoded.len() < original.len() => encoded,
                Ok(_) => original.clone(),
                Err(e) => {
                    warning = Some(format!("{}: kept original ({})", file.display(), e));
                    original.clone()
                }
            }
        }
        None => original.clone(),
    };

    write_output(out, &bytes)?;
    debug!(file = %file.display(), before = original.len(), after = bytes.len(), "image");
    Ok(Minified { out: out.to_path_buf(), before: original.len(), after: bytes.len(), warning })
}

fn reencode(image: &DynamicImage, format: ImageFormat, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ColorType::Rgb8,
            )?;
        }
        _ => {
            PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
                .write_image(image.as_bytes(), image.width(), image.height(), image.color())?;
        }
    }
    Ok(buf)
}
