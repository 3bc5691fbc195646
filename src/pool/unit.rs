//! # Execution Unit Module
//!
//! Un execution unit è un worker persistente che processa chunk di task in
//! modo strettamente sequenziale.
//!
//! ## Responsabilità:
//! - Loop di comando persistente (un unit vive per tutta la vita del pool)
//! - Per ogni task: progress `start`, pipeline, progress `complete`/`error`
//! - Failure isolation: un errore task-level NON interrompe il chunk, diventa
//!   un risultato sintetico fallito
//! - A fine chunk: un unico messaggio aggregato `results` verso il pool
//! - Un panic che sfugge al boundary per-task viene catturato al boundary
//!   del chunk e segnalato come `fatal` (transport failure)

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::optimize::{ImageOptimizer, OptimizationResult};
use crate::progress::ProgressMessage;
use crate::settings::ImageTask;

/// Pool → unit commands.
///
/// `generation` identifies the batch the chunk belongs to; the unit echoes
/// it on every message so the pool can discard messages from a batch it has
/// already rejected.
#[derive(Debug)]
pub enum UnitCommand {
    /// Process this chunk of tasks sequentially, then report aggregate results.
    Process {
        generation: u64,
        tasks: Vec<ImageTask>,
    },
}

/// Unit → pool messages, each tagged with its batch generation.
#[derive(Debug)]
pub enum UnitMessage {
    /// Per-task progress (start/complete/error)
    Progress {
        generation: u64,
        message: ProgressMessage,
    },
    /// End of chunk: every result of the chunk, in local order
    Results {
        generation: u64,
        worker_id: usize,
        results: Vec<OptimizationResult>,
    },
    /// The unit failed outside its per-task boundary; the batch must abort
    Fatal {
        generation: u64,
        worker_id: usize,
        error: String,
    },
}

impl UnitMessage {
    /// Generation of the batch this message belongs to.
    pub fn generation(&self) -> u64 {
        match self {
            UnitMessage::Progress { generation, .. }
            | UnitMessage::Results { generation, .. }
            | UnitMessage::Fatal { generation, .. } => *generation,
        }
    }
}

/// A persistent worker processing chunks one task at a time.
pub struct ExecutionUnit {
    worker_id: usize,
    optimizer: ImageOptimizer,
    events: mpsc::UnboundedSender<UnitMessage>,
}

impl ExecutionUnit {
    /// Spawns the unit's command loop, returning its command channel.
    pub fn spawn(
        worker_id: usize,
        optimizer: ImageOptimizer,
        events: mpsc::UnboundedSender<UnitMessage>,
    ) -> (mpsc::UnboundedSender<UnitCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let unit = Self {
            worker_id,
            optimizer,
            events,
        };
        let handle = tokio::spawn(unit.run(rx));
        (tx, handle)
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<UnitCommand>) {
        debug!("Worker {} ready", self.worker_id);
        while let Some(command) = commands.recv().await {
            match command {
                UnitCommand::Process { generation, tasks } => {
                    let outcome = AssertUnwindSafe(self.process_chunk(generation, &tasks))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(results) => {
                            let _ = self.events.send(UnitMessage::Results {
                                generation,
                                worker_id: self.worker_id,
                                results,
                            });
                        }
                        Err(panic) => {
                            let error = panic_message(panic);
                            warn!("Worker {} crashed: {}", self.worker_id, error);
                            let _ = self.events.send(UnitMessage::Fatal {
                                generation,
                                worker_id: self.worker_id,
                                error,
                            });
                        }
                    }
                }
            }
        }
        debug!("Worker {} stopped", self.worker_id);
    }

    /// Processes the chunk strictly one task at a time.
    ///
    /// Task-level errors are absorbed here: the chunk always yields one
    /// result per task.
    async fn process_chunk(&self, generation: u64, tasks: &[ImageTask]) -> Vec<OptimizationResult> {
        let mut results = Vec::with_capacity(tasks.len());

        for task in tasks {
            let file_name = task.file_name();
            let _ = self.events.send(UnitMessage::Progress {
                generation,
                message: ProgressMessage::Start {
                    task_id: task.input_path.clone(),
                    worker_id: self.worker_id,
                    file_name: file_name.clone(),
                },
            });

            let result = match self.optimizer.optimize(task).await {
                Ok(result) => {
                    let _ = self.events.send(UnitMessage::Progress {
                        generation,
                        message: ProgressMessage::Complete {
                            task_id: task.input_path.clone(),
                            worker_id: self.worker_id,
                            file_name: file_name.clone(),
                            formatted_message: result.summary(),
                            result: result.clone(),
                        },
                    });
                    result
                }
                Err(e) => {
                    debug!("Task failed on worker {}: {}", self.worker_id, e);
                    let result = OptimizationResult::failed(task, e.to_string());
                    let _ = self.events.send(UnitMessage::Progress {
                        generation,
                        message: ProgressMessage::Error {
                            task_id: task.input_path.clone(),
                            worker_id: self.worker_id,
                            file_name,
                            error: e.to_string(),
                        },
                    });
                    result
                }
            };
            results.push(result);
        }

        results
    }
}

/// Extracts a readable message from a caught panic payload.
fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
