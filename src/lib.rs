//! # Batch Image Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `error`: Tipi di errore custom per le diverse operazioni
//! - `formats`: Formati supportati, preset di encoding e policy qualità/lossless
//! - `settings`: Task e settings per-immagine con validazione pre-dispatch
//! - `resize`: Risoluzione delle dimensioni target (width/height/longest/shortest)
//! - `codec`: Boundary probe/transcode verso la libreria di encoding
//! - `optimize`: Pipeline di ottimizzazione della singola immagine
//! - `progress`: Protocollo di progresso e throttling degli update
//! - `pool`: Worker pool con execution unit persistenti e chunking
//! - `json_output`: Output NDJSON per processi chiamanti
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::sync::Arc;
//! use batch_image_optimizer::{ImageCrateCodec, NullReporter, WorkerPool};
//!
//! # async fn run(tasks: Vec<batch_image_optimizer::ImageTask>) -> anyhow::Result<()> {
//! let mut pool = WorkerPool::new(Arc::new(ImageCrateCodec), None)?;
//! let output = pool.process_batch(tasks, &NullReporter).await?;
//! pool.terminate();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod formats;
pub mod json_output;
pub mod optimize;
pub mod pool;
pub mod progress;
pub mod resize;
pub mod settings;
pub mod utils;

pub use codec::{Codec, ImageCrateCodec, ImageMeta};
pub use error::{OptimizeError, OptimizeResult};
pub use formats::{EncodeParams, FormatPolicy, ImageFormat};
pub use json_output::{JsonMessage, JsonReporter};
pub use optimize::{ImageOptimizer, OptimizationResult};
pub use pool::{BatchOutput, WorkerPool};
pub use progress::{ConsoleReporter, NullReporter, ProgressReporter, ProgressUpdate};
pub use settings::{ImageSettings, ImageTask};
