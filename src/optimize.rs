//! # Single-Image Pipeline Module
//!
//! Questo modulo implementa la pipeline di ottimizzazione di una singola
//! immagine: validate → metadata → resize → encode → stats.
//!
//! ## Responsabilità:
//! - Validazione input/output (path vuoti, file illeggibili o di dimensione 0)
//! - Probe dei metadata tramite il codec collaborator
//! - Risoluzione del formato di output ("original" → formato rilevato)
//! - Risoluzione resize e parametri di encoding (FormatPolicy)
//! - Normalizzazione dell'estensione del path di output
//! - Calcolo delle statistiche di compressione nel risultato standard
//!
//! ## Failure points:
//! Ogni step è un punto di fallimento distinto; tutti gli errori sono
//! task-level e vengono assorbiti dall'execution unit chiamante.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::Codec;
use crate::error::{OptimizeError, OptimizeResult};
use crate::formats::{FormatPolicy, ImageFormat};
use crate::resize::resolve_resize;
use crate::settings::ImageTask;

/// Standardized result of one image optimization.
///
/// `saved_bytes` may be negative when the output grew; `compression_ratio`
/// is always a two-decimal percentage string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Path the optimized file was written to (input path on failure)
    pub path: String,
    pub original_size: u64,
    pub optimized_size: u64,
    pub saved_bytes: i64,
    pub compression_ratio: String,
    /// Resolved output format name, absent on failure
    pub format: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

impl OptimizationResult {
    /// Synthetic failed result used when any task-level error is absorbed.
    pub fn failed(task: &ImageTask, error: impl Into<String>) -> Self {
        Self {
            path: task.input_path.clone(),
            original_size: 0,
            optimized_size: 0,
            saved_bytes: 0,
            compression_ratio: "0.00".to_string(),
            format: None,
            success: false,
            error: Some(error.into()),
            file_name: task.file_name(),
        }
    }

    /// Human summary carried by complete progress messages.
    pub fn summary(&self) -> String {
        format!(
            "{} optimized: {} → {} ({}% reduction)",
            self.file_name, self.original_size, self.optimized_size, self.compression_ratio
        )
    }
}

/// Percentage of bytes saved, formatted to exactly two decimal places.
///
/// `original_size == 0` must have been rejected by earlier validation.
pub fn compression_ratio(original_size: u64, optimized_size: u64) -> String {
    let saved = original_size as i64 - optimized_size as i64;
    format!("{:.2}", saved as f64 / original_size as f64 * 100.0)
}

/// Runs the single-image pipeline over the codec collaborator.
#[derive(Clone)]
pub struct ImageOptimizer {
    codec: Arc<dyn Codec>,
}

impl ImageOptimizer {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// Optimizes one task end to end, returning the standardized result.
    pub async fn optimize(&self, task: &ImageTask) -> OptimizeResult<OptimizationResult> {
        task.validate()?;

        let input = Path::new(&task.input_path);
        let metadata = tokio::fs::metadata(input).await.map_err(|e| {
            OptimizeError::validation(format!(
                "Input file is not readable: {}: {e}",
                input.display()
            ))
        })?;
        let original_size = metadata.len();
        if original_size == 0 {
            return Err(OptimizeError::validation(format!(
                "Input file is empty: {}",
                input.display()
            )));
        }

        let meta = self.codec.probe(input)?;
        debug!(
            "Probed {}: {} {}x{}",
            input.display(),
            meta.format,
            meta.width,
            meta.height
        );

        let output_format = resolve_output_format(&task.settings.output_format, meta.format)?;
        let resize = resolve_resize(&task.settings.resize, meta.width, meta.height)?;
        let params = FormatPolicy::resolve(output_format, &task.settings.quality);
        let output = normalize_output_path(&task.output_path, output_format);

        self.codec.transcode(input, &output, resize, &params)?;

        let optimized_size = tokio::fs::metadata(&output)
            .await
            .map_err(|e| {
                OptimizeError::processing(format!(
                    "Failed to stat output {}: {e}",
                    output.display()
                ))
            })?
            .len();

        let result = OptimizationResult {
            path: output.to_string_lossy().into_owned(),
            original_size,
            optimized_size,
            saved_bytes: original_size as i64 - optimized_size as i64,
            compression_ratio: compression_ratio(original_size, optimized_size),
            format: Some(output_format.name().to_string()),
            success: true,
            error: None,
            file_name: task.file_name(),
        };
        debug!("{}", result.summary());
        Ok(result)
    }
}

/// Maps the requested output format to a concrete one: the literal
/// "original" keeps the detected input format.
fn resolve_output_format(requested: &str, detected: ImageFormat) -> OptimizeResult<ImageFormat> {
    if requested == "original" {
        Ok(detected)
    } else {
        ImageFormat::from_str(requested)
    }
}

/// Rewrites the output extension to match `format`, only when it differs.
/// Extension aliases ("jpg"/"jpeg", "tif"/"tiff") count as matching.
fn normalize_output_path(output: &str, format: ImageFormat) -> PathBuf {
    let path = PathBuf::from(output);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if format.matches_extension(ext) => path,
        _ => path.with_extension(format.extension()),
    }
}
