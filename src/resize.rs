//! # Resize Resolution Module
//!
//! Questo modulo traduce le impostazioni di resize in dimensioni target
//! concrete a partire dalle dimensioni originali dell'immagine.
//!
//! ## Modalità supportate:
//! - `none`: nessun resize
//! - `width`: vincola la larghezza a `size`, altezza libera
//! - `height`: vincola l'altezza a `size`, larghezza libera
//! - `longest`: vincola il lato più lungo (tie risolto verso width)
//! - `shortest`: vincola il lato più corto (tie risolto verso width)
//!
//! ## Invarianti:
//! - Non si ingrandisce mai oltre le dimensioni originali
//! - L'aspect ratio è sempre preservato (fit = contain)
//! - Una modalità sconosciuta è un errore di validazione

use std::str::FromStr;

use crate::error::{OptimizeError, OptimizeResult};
use crate::settings::ResizeSettings;

/// Resize mode, parsed from the task settings string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    None,
    Width,
    Height,
    Longest,
    Shortest,
}

impl FromStr for ResizeMode {
    type Err = OptimizeError;

    fn from_str(s: &str) -> OptimizeResult<Self> {
        match s {
            "none" => Ok(ResizeMode::None),
            "width" => Ok(ResizeMode::Width),
            "height" => Ok(ResizeMode::Height),
            "longest" => Ok(ResizeMode::Longest),
            "shortest" => Ok(ResizeMode::Shortest),
            unknown => Err(OptimizeError::validation(format!(
                "Unknown resize mode: {unknown}"
            ))),
        }
    }
}

/// Concrete bounding box the codec should fit the image into.
///
/// The box already accounts for the no-enlargement rule, so the codec can
/// scale to contain-within-box without further checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeTarget {
    pub width: u32,
    pub height: u32,
}

/// Resolves the resize settings against the original dimensions.
///
/// Returns `None` when no resize should happen: mode "none", missing size,
/// or a target that would enlarge the image.
pub fn resolve_resize(
    settings: &ResizeSettings,
    orig_width: u32,
    orig_height: u32,
) -> OptimizeResult<Option<ResizeTarget>> {
    let mode: ResizeMode = settings.mode.parse()?;

    if mode == ResizeMode::None {
        return Ok(None);
    }

    let size = match settings.size {
        Some(s) if s > 0 => s,
        _ => return Ok(None),
    };

    let constrain_width = match mode {
        ResizeMode::Width => true,
        ResizeMode::Height => false,
        // Tie (square image) resolves toward the width-constrained branch.
        ResizeMode::Longest => orig_width >= orig_height,
        ResizeMode::Shortest => orig_width <= orig_height,
        ResizeMode::None => unreachable!(),
    };

    let target = if constrain_width {
        scale_to_width(orig_width, orig_height, size)
    } else {
        scale_to_height(orig_width, orig_height, size)
    };

    Ok(target)
}

/// Scales so the width becomes `target_w`, height proportional. Never enlarges.
fn scale_to_width(orig_w: u32, orig_h: u32, target_w: u32) -> Option<ResizeTarget> {
    if target_w >= orig_w {
        return None;
    }
    let scale = target_w as f64 / orig_w as f64;
    Some(ResizeTarget {
        width: target_w,
        height: ((orig_h as f64 * scale).round() as u32).max(1),
    })
}

/// Scales so the height becomes `target_h`, width proportional. Never enlarges.
fn scale_to_height(orig_w: u32, orig_h: u32, target_h: u32) -> Option<ResizeTarget> {
    if target_h >= orig_h {
        return None;
    }
    let scale = target_h as f64 / orig_h as f64;
    Some(ResizeTarget {
        width: ((orig_w as f64 * scale).round() as u32).max(1),
        height: target_h,
    })
}
