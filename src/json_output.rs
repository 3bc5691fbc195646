//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (newline-delimited)
//! per la comunicazione con processi chiamanti.
//!
//! ## Tipi di messaggi:
//! - `progress`: evento per-task (start/complete/error)
//! - `progress_update`: aggregato throttled
//! - `detailed_progress`: metriche per-file + percentuale batch
//! - `complete`: fine batch con risultati ordinati e metriche del pool
//! - `error`: errore top-level (batch rifiutato)
//!
//! Ogni messaggio è un oggetto JSON su una singola riga di stdout.

use serde::{Deserialize, Serialize};

use crate::optimize::OptimizationResult;
use crate::progress::{
    DetailedProgressUpdate, ProgressMessage, ProgressReporter, ProgressUpdate, WorkerPoolMetrics,
};

/// Newline-delimited JSON envelope written to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Per-task progress event
    #[serde(rename = "progress")]
    Progress {
        #[serde(flatten)]
        message: ProgressMessage,
    },

    /// Throttled aggregate progress
    #[serde(rename = "progress_update")]
    ProgressUpdate {
        #[serde(flatten)]
        update: ProgressUpdate,
    },

    /// Per-file metrics with batch percentage
    #[serde(rename = "detailed_progress")]
    DetailedProgress {
        #[serde(flatten)]
        update: DetailedProgressUpdate,
    },

    /// Batch finished: results in input order plus pool metrics
    #[serde(rename = "complete")]
    Complete {
        results: Vec<OptimizationResult>,
        metrics: WorkerPoolMetrics,
    },

    /// Top-level failure (the whole batch was rejected)
    #[serde(rename = "error")]
    Error { message: String },
}

impl JsonMessage {
    /// Writes the message as one JSON line on stdout.
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }
}

/// Reporter that emits every progress event as NDJSON.
pub struct JsonReporter;

impl ProgressReporter for JsonReporter {
    fn progress(&self, message: &ProgressMessage) {
        JsonMessage::Progress {
            message: message.clone(),
        }
        .emit();
    }

    fn progress_update(&self, update: &ProgressUpdate) {
        JsonMessage::ProgressUpdate {
            update: update.clone(),
        }
        .emit();
    }

    fn detailed_progress(&self, update: &DetailedProgressUpdate) {
        JsonMessage::DetailedProgress {
            update: update.clone(),
        }
        .emit();
    }
}
