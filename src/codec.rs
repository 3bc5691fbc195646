//! # Codec Collaborator Module
//!
//! Questo modulo definisce il boundary verso la libreria di image processing
//! vera e propria: il resto del crate tratta "decodifica/resize/encode di
//! un'immagine" come una chiamata opaca a questo trait.
//!
//! ## Responsabilità:
//! - Trait `Codec` con due operazioni: probe dei metadata e transcode su file
//! - `ImageCrateCodec`: implementazione di default basata sul crate `image`
//! - Mapping dei parametri risolti dalla FormatPolicy sugli encoder disponibili
//!
//! ## Limiti dell'implementazione di default:
//! - AVIF non è codificabile con il feature set corrente: il transcode
//!   restituisce un Processing error, assorbito per-task come ogni altro
//!   errore del codec
//! - I campi dei preset senza equivalente diretto nell'encoder (mozjpeg,
//!   effort, predictor) guidano solo la scelta di compression/filter

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::ImageEncoder;
use tracing::debug;

use crate::error::{OptimizeError, OptimizeResult};
use crate::formats::{EncodeParams, ImageFormat};
use crate::resize::ResizeTarget;

/// Metadata obtained from a cheap decode of the image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMeta {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// The external image-processing collaborator.
///
/// Implementations are called from execution units; a returned error is
/// absorbed at the per-task boundary, a panic escapes it and aborts the batch.
pub trait Codec: Send + Sync {
    /// Decodes just enough of `path` to learn its format and dimensions.
    fn probe(&self, path: &Path) -> OptimizeResult<ImageMeta>;

    /// Decodes `input`, optionally fits it into `resize`, encodes with
    /// `params` and writes the result to `output`.
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        resize: Option<ResizeTarget>,
        params: &EncodeParams,
    ) -> OptimizeResult<()>;
}

/// Default codec backed by the `image` crate.
pub struct ImageCrateCodec;

impl Codec for ImageCrateCodec {
    fn probe(&self, path: &Path) -> OptimizeResult<ImageMeta> {
        let reader = ImageReader::open(path)
            .map_err(|e| OptimizeError::processing(format!("Failed to open image: {e}")))?
            .with_guessed_format()
            .map_err(|e| OptimizeError::processing(format!("Failed to sniff format: {e}")))?;

        let format = match reader.format() {
            Some(f) => map_input_format(f)?,
            None => {
                return Err(OptimizeError::validation(format!(
                    "Unrecognized image format: {}",
                    path.display()
                )))
            }
        };

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| OptimizeError::processing(format!("Failed to read dimensions: {e}")))?;

        Ok(ImageMeta {
            format,
            width,
            height,
        })
    }

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        resize: Option<ResizeTarget>,
        params: &EncodeParams,
    ) -> OptimizeResult<()> {
        let mut img = ImageReader::open(input)
            .map_err(|e| OptimizeError::processing(format!("Failed to open image: {e}")))?
            .with_guessed_format()
            .map_err(|e| OptimizeError::processing(format!("Failed to sniff format: {e}")))?
            .decode()
            .map_err(|e| OptimizeError::processing(format!("Decode failed: {e}")))?;

        if let Some(target) = resize {
            debug!(
                "Resizing {} to fit {}x{}",
                input.display(),
                target.width,
                target.height
            );
            img = img.resize(target.width, target.height, FilterType::Lanczos3);
        }

        let file = File::create(output)
            .map_err(|e| OptimizeError::processing(format!("Failed to create output: {e}")))?;
        let writer = BufWriter::new(file);

        encode(img, writer, params)
            .map_err(|e| OptimizeError::processing(format!("Encode failed: {e}")))
    }
}

/// Maps a detected `image` crate format onto the supported closed set.
fn map_input_format(format: image::ImageFormat) -> OptimizeResult<ImageFormat> {
    match format {
        image::ImageFormat::Jpeg => Ok(ImageFormat::Jpeg),
        image::ImageFormat::Png => Ok(ImageFormat::Png),
        image::ImageFormat::WebP => Ok(ImageFormat::Webp),
        image::ImageFormat::Avif => Ok(ImageFormat::Avif),
        image::ImageFormat::Tiff => Ok(ImageFormat::Tiff),
        other => Err(OptimizeError::validation(format!(
            "Unsupported input format: {other:?}"
        ))),
    }
}

#[allow(deprecated)] // the lossy WebP encoder is deprecated upstream but has no replacement in 0.24
fn encode(
    img: image::DynamicImage,
    mut writer: BufWriter<File>,
    params: &EncodeParams,
) -> image::ImageResult<()> {
    use image::codecs::{jpeg, png, tiff, webp};

    match params {
        EncodeParams::Jpeg { quality, .. } => {
            let rgb = img.to_rgb8();
            let mut encoder =
                jpeg::JpegEncoder::new_with_quality(&mut writer, (*quality).clamp(1, 100) as u8);
            encoder.encode_image(&rgb)
        }
        EncodeParams::Png {
            compression_level,
            adaptive_filtering,
            ..
        } => {
            let compression = if *compression_level >= 9 {
                png::CompressionType::Best
            } else if *compression_level <= 3 {
                png::CompressionType::Fast
            } else {
                png::CompressionType::Default
            };
            let filter = if *adaptive_filtering {
                png::FilterType::Adaptive
            } else {
                png::FilterType::NoFilter
            };
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            png::PngEncoder::new_with_quality(writer, compression, filter).write_image(
                rgba.as_raw(),
                w,
                h,
                image::ColorType::Rgba8,
            )
        }
        EncodeParams::Webp {
            quality, lossless, ..
        } => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let encoder = if *lossless {
                webp::WebPEncoder::new_lossless(writer)
            } else {
                webp::WebPEncoder::new_with_quality(
                    writer,
                    webp::WebPQuality::lossy((*quality).clamp(1, 100) as u8),
                )
            };
            encoder.write_image(rgba.as_raw(), w, h, image::ColorType::Rgba8)
        }
        EncodeParams::Avif { .. } => Err(image::ImageError::Unsupported(
            image::error::UnsupportedError::from_format_and_kind(
                image::error::ImageFormatHint::Name("avif".to_string()),
                image::error::UnsupportedErrorKind::Format(image::error::ImageFormatHint::Name(
                    "avif".to_string(),
                )),
            ),
        )),
        EncodeParams::Tiff { .. } => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            tiff::TiffEncoder::new(writer).write_image(
                rgba.as_raw(),
                w,
                h,
                image::ColorType::Rgba8,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_image.jpg");
        std::fs::write(&path, b"plain text, no magic bytes").unwrap();

        let err = ImageCrateCodec.probe(&path).unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::Validation(_) | OptimizeError::Processing(_)
        ));
    }

    #[test]
    fn test_probe_reads_png_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        let img = image::RgbaImage::from_pixel(12, 8, image::Rgba([10, 20, 30, 255]));
        img.save(&path).unwrap();

        let meta = ImageCrateCodec.probe(&path).unwrap();
        assert_eq!(meta.format, ImageFormat::Png);
        assert_eq!((meta.width, meta.height), (12, 8));
    }

    #[test]
    fn test_transcode_png_to_jpeg_with_resize() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.jpg");
        let img = image::RgbaImage::from_pixel(64, 32, image::Rgba([200, 100, 50, 255]));
        img.save(&input).unwrap();

        let params = crate::formats::FormatPolicy::resolve(
            ImageFormat::Jpeg,
            &crate::settings::QualitySettings::default(),
        );
        ImageCrateCodec
            .transcode(
                &input,
                &output,
                Some(ResizeTarget {
                    width: 32,
                    height: 16,
                }),
                &params,
            )
            .unwrap();

        let meta = ImageCrateCodec.probe(&output).unwrap();
        assert_eq!(meta.format, ImageFormat::Jpeg);
        assert_eq!((meta.width, meta.height), (32, 16));
    }

    #[test]
    fn test_avif_encode_reports_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.avif");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]))
            .save(&input)
            .unwrap();

        let params = crate::formats::FormatPolicy::resolve(
            ImageFormat::Avif,
            &crate::settings::QualitySettings::default(),
        );
        let err = ImageCrateCodec
            .transcode(&input, &output, None, &params)
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Processing(_)));
    }
}
