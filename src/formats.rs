//! # Format Policy Module
//!
//! Questo modulo risolve i parametri di encoding per ogni formato supportato.
//!
//! ## Responsabilità:
//! - Definisce il set chiuso dei formati supportati (jpeg, png, webp, avif, tiff)
//! - Tabelle di preset di default per ogni formato
//! - Preset lossless attivati quando la quality effettiva è 100
//! - Risoluzione deterministica: override per-formato > quality globale
//!
//! ## Regole di risoluzione:
//! 1. Quality effettiva = override per-formato se presente, altrimenti global
//! 2. Quality == 100 → preset lossless fisso (indipendente da ogni altro campo)
//! 3. Altrimenti → preset di default con SOLO il campo quality sovrascritto
//!
//! I valori delle tabelle sono costanti letterali e vanno riprodotti
//! bit-per-bit dove conta la compatibilità.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, OptimizeResult};
use crate::settings::QualitySettings;

/// Default quality applied when no explicit quality is provided.
pub const DEFAULT_QUALITY: u32 = 90;

const PNG_COMPRESSION: u8 = 7;
const PNG_EFFORT: u8 = 4;
const WEBP_EFFORT: u8 = 4;
const WEBP_ALPHA_QUALITY: u32 = 90;
const AVIF_EFFORT: u8 = 2;
const TIFF_TILE_SIZE: u32 = 256;

/// Closed set of supported image formats.
///
/// Any format outside this enum is rejected at parse time, so downstream
/// matching is exhaustive instead of string-keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Webp,
        ImageFormat::Avif,
        ImageFormat::Tiff,
    ];

    /// Canonical name used on the wire ("jpeg", "png", ...).
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Preferred file extension for output path normalization.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// True when `ext` (without dot, any case) already denotes this format.
    /// "jpg" and "jpeg" are aliases, as are "tif" and "tiff".
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            ImageFormat::Jpeg => ext == "jpg" || ext == "jpeg",
            ImageFormat::Tiff => ext == "tif" || ext == "tiff",
            other => ext == other.extension(),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = OptimizeError;

    fn from_str(s: &str) -> OptimizeResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            "avif" => Ok(ImageFormat::Avif),
            "tiff" | "tif" => Ok(ImageFormat::Tiff),
            other => Err(OptimizeError::config(format!(
                "Unsupported format: {other}"
            ))),
        }
    }
}

/// Chroma subsampling mode for jpeg/avif.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    /// 4:2:0
    #[serde(rename = "4:2:0")]
    Quarter,
    /// 4:4:4 (no subsampling)
    #[serde(rename = "4:4:4")]
    Full,
}

/// Resolved encoder parameters, one variant per supported format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncodeParams {
    Jpeg {
        quality: u32,
        mozjpeg: bool,
        chroma_subsampling: ChromaSubsampling,
        optimize_coding: bool,
    },
    Png {
        quality: u32,
        compression_level: u8,
        adaptive_filtering: bool,
        palette: bool,
        effort: u8,
    },
    Webp {
        quality: u32,
        alpha_quality: u32,
        effort: u8,
        lossless: bool,
        smart_subsample: bool,
    },
    Avif {
        quality: u32,
        effort: u8,
        chroma_subsampling: ChromaSubsampling,
        lossless: bool,
    },
    Tiff {
        quality: u32,
        deflate_compression: bool,
        horizontal_predictor: bool,
        tile: bool,
        tile_size: u32,
        preserve_icc: bool,
    },
}

impl EncodeParams {
    /// Format this parameter set belongs to.
    pub fn format(&self) -> ImageFormat {
        match self {
            EncodeParams::Jpeg { .. } => ImageFormat::Jpeg,
            EncodeParams::Png { .. } => ImageFormat::Png,
            EncodeParams::Webp { .. } => ImageFormat::Webp,
            EncodeParams::Avif { .. } => ImageFormat::Avif,
            EncodeParams::Tiff { .. } => ImageFormat::Tiff,
        }
    }
}

/// Deterministic per-format encode parameter resolution.
pub struct FormatPolicy;

impl FormatPolicy {
    /// True when `format` names a member of the supported set.
    pub fn is_supported(format: &str) -> bool {
        ImageFormat::from_str(format).is_ok()
    }

    /// Effective quality for `format`: per-format override wins over global.
    pub fn effective_quality(quality: &QualitySettings, format: ImageFormat) -> u32 {
        let per_format = match format {
            ImageFormat::Jpeg => quality.jpeg,
            ImageFormat::Png => quality.png,
            ImageFormat::Webp => quality.webp,
            ImageFormat::Avif => quality.avif,
            ImageFormat::Tiff => quality.tiff,
        };
        per_format.unwrap_or(quality.global)
    }

    /// Resolves final encoder parameters for `format`.
    ///
    /// Effective quality 100 triggers the fixed lossless preset; any other
    /// value starts from the default preset and overwrites only the scalar
    /// quality field.
    pub fn resolve(format: ImageFormat, quality: &QualitySettings) -> EncodeParams {
        let q = Self::effective_quality(quality, format);
        if q == 100 {
            Self::lossless_preset(format)
        } else {
            Self::default_preset(format, q)
        }
    }

    /// Default preset table with the scalar quality overwritten.
    fn default_preset(format: ImageFormat, quality: u32) -> EncodeParams {
        match format {
            ImageFormat::Jpeg => EncodeParams::Jpeg {
                quality,
                mozjpeg: true,
                chroma_subsampling: ChromaSubsampling::Quarter,
                optimize_coding: true,
            },
            ImageFormat::Png => EncodeParams::Png {
                quality,
                compression_level: PNG_COMPRESSION,
                adaptive_filtering: true,
                palette: true,
                effort: PNG_EFFORT,
            },
            ImageFormat::Webp => EncodeParams::Webp {
                quality,
                alpha_quality: WEBP_ALPHA_QUALITY,
                effort: WEBP_EFFORT,
                lossless: false,
                smart_subsample: false,
            },
            ImageFormat::Avif => EncodeParams::Avif {
                quality,
                effort: AVIF_EFFORT,
                chroma_subsampling: ChromaSubsampling::Quarter,
                lossless: false,
            },
            ImageFormat::Tiff => EncodeParams::Tiff {
                quality,
                deflate_compression: true,
                horizontal_predictor: true,
                tile: true,
                tile_size: TIFF_TILE_SIZE,
                preserve_icc: false,
            },
        }
    }

    /// Fixed lossless preset table, independent of every other quality field.
    fn lossless_preset(format: ImageFormat) -> EncodeParams {
        match format {
            ImageFormat::Jpeg => EncodeParams::Jpeg {
                quality: 100,
                mozjpeg: true,
                chroma_subsampling: ChromaSubsampling::Full,
                optimize_coding: true,
            },
            ImageFormat::Png => EncodeParams::Png {
                quality: 100,
                compression_level: 9,
                adaptive_filtering: true,
                palette: false,
                effort: 10,
            },
            ImageFormat::Webp => EncodeParams::Webp {
                quality: 100,
                alpha_quality: 100,
                effort: 6,
                lossless: true,
                smart_subsample: false,
            },
            ImageFormat::Avif => EncodeParams::Avif {
                quality: 100,
                effort: 9,
                chroma_subsampling: ChromaSubsampling::Full,
                lossless: true,
            },
            ImageFormat::Tiff => EncodeParams::Tiff {
                quality: 100,
                deflate_compression: true,
                horizontal_predictor: true,
                tile: true,
                tile_size: TIFF_TILE_SIZE,
                preserve_icc: true,
            },
        }
    }
}
