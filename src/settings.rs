//! # Task Settings Module
//!
//! Questo modulo definisce i tipi di configurazione per-task e la loro
//! validazione pre-dispatch.
//!
//! ## Responsabilità:
//! - Definisce `ImageTask` (input, output, settings), immutabile dopo il dispatch
//! - `QualitySettings` con quality globale e override per-formato
//! - `ResizeSettings` con modalità none/width/height/longest/shortest
//! - Validazione dei parametri prima che il task raggiunga un worker
//!
//! ## Formato wire:
//! I nomi dei campi JSON seguono il protocollo originale: `{input, output,
//! settings}` con `outputFormat` e `maintainAspect` in camelCase.

use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, OptimizeResult};
use crate::formats::DEFAULT_QUALITY;

/// A single optimization task. Immutable once dispatched to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTask {
    /// Path to the source image
    #[serde(rename = "input", alias = "inputPath")]
    pub input_path: String,
    /// Path the optimized image is written to (extension may be rewritten to
    /// match the resolved output format)
    #[serde(rename = "output", alias = "outputPath")]
    pub output_path: String,
    /// Quality / resize / format settings
    #[serde(default)]
    pub settings: ImageSettings,
}

/// Configuration settings for one image optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Quality settings for compression
    #[serde(default)]
    pub quality: QualitySettings,
    /// Resize settings for image dimensions
    #[serde(default)]
    pub resize: ResizeSettings,
    /// Output format: "original" keeps the detected input format, otherwise
    /// one of jpeg/png/webp/avif/tiff
    #[serde(rename = "outputFormat", default = "default_output_format")]
    pub output_format: String,
}

// A derived Default would leave output_format empty, which is not a member
// of the accepted format set.
impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            quality: QualitySettings::default(),
            resize: ResizeSettings::default(),
            output_format: default_output_format(),
        }
    }
}

fn default_output_format() -> String {
    "original".to_string()
}

/// Quality settings: a global level plus per-format overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Global quality level (1-100), used when no per-format override is set
    pub global: u32,
    /// JPEG-specific quality override
    #[serde(default)]
    pub jpeg: Option<u32>,
    /// PNG-specific quality override
    #[serde(default)]
    pub png: Option<u32>,
    /// WebP-specific quality override
    #[serde(default)]
    pub webp: Option<u32>,
    /// AVIF-specific quality override
    #[serde(default)]
    pub avif: Option<u32>,
    /// TIFF-specific quality override
    #[serde(default)]
    pub tiff: Option<u32>,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            global: DEFAULT_QUALITY,
            jpeg: None,
            png: None,
            webp: None,
            avif: None,
            tiff: None,
        }
    }
}

/// Resize settings for image dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeSettings {
    /// Resize mode: "none", "width", "height", "longest", "shortest"
    pub mode: String,
    /// Target size in pixels for the constrained dimension
    #[serde(default)]
    pub size: Option<u32>,
    /// Whether to maintain aspect ratio when resizing
    #[serde(rename = "maintainAspect", default = "default_true")]
    pub maintain_aspect: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            mode: "none".to_string(),
            size: None,
            maintain_aspect: true,
        }
    }
}

impl ImageTask {
    /// Validates paths and settings before the task is dispatched.
    ///
    /// Path existence and readability are checked later by the pipeline; this
    /// catches structurally invalid tasks early.
    pub fn validate(&self) -> OptimizeResult<()> {
        if self.input_path.trim().is_empty() {
            return Err(OptimizeError::validation("Input path cannot be empty"));
        }
        if self.output_path.trim().is_empty() {
            return Err(OptimizeError::validation("Output path cannot be empty"));
        }
        self.settings.validate()
    }

    /// File name of the input without its directory, used as task identity in
    /// progress messages.
    pub fn file_name(&self) -> String {
        crate::utils::extract_filename(&self.input_path)
    }
}

impl ImageSettings {
    /// Validate quality and resize parameters.
    pub fn validate(&self) -> OptimizeResult<()> {
        self.quality.validate()?;

        if let Some(size) = self.resize.size {
            if size == 0 {
                return Err(OptimizeError::validation("Resize size cannot be 0"));
            }
        }

        Ok(())
    }
}

impl QualitySettings {
    fn validate(&self) -> OptimizeResult<()> {
        let mut levels = vec![("global", self.global)];
        for (name, value) in [
            ("jpeg", self.jpeg),
            ("png", self.png),
            ("webp", self.webp),
            ("avif", self.avif),
            ("tiff", self.tiff),
        ] {
            if let Some(v) = value {
                levels.push((name, v));
            }
        }

        for (name, value) in levels {
            if value == 0 || value > 100 {
                return Err(OptimizeError::validation(format!(
                    "Invalid {name} quality value: {value}. Must be between 1 and 100"
                )));
            }
        }
        Ok(())
    }
}
