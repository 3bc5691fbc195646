//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Validation`: Input non validi (path vuoti, file illeggibili, formati
//!   non supportati, resize mode sconosciuto)
//! - `Processing`: Errori del codec (decode, resize, encode/write)
//! - `Config`: Configurazione non valida (worker count zero, pool terminato)
//! - `Transport`: Un execution unit è crashato fuori dal boundary per-task;
//!   questo errore NON viene assorbito e fa fallire l'intero batch
//! - `Io`: Errori I/O standard
//!
//! ## Propagazione:
//! Validation/Processing/Config vengono convertiti in `OptimizationResult`
//! falliti dentro l'execution unit; solo Transport attraversa il pool.

use thiserror::Error;

/// Custom error types for batch image optimization
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OptimizeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// True for errors absorbed at the per-task boundary (everything except
    /// transport failures, which abort the whole batch).
    pub fn is_task_level(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

/// Convenience result type for optimizer operations.
pub type OptimizeResult<T> = Result<T, OptimizeError>;
