//! # Worker Pool Module
//!
//! Questo è il modulo che orchestra il batch processing su un set fisso di
//! execution unit persistenti.
//!
//! ## Responsabilità:
//! - Spawn eager di `max_workers` unit al momento della creazione
//! - Chunking: `chunk_size = ceil(batch / max_workers)`, chunk contigui
//! - Placement dei risultati per indice globale `worker*chunk_size + locale`,
//!   mai per ordine di arrivo
//! - Conteggio progressi e update throttled verso il reporter
//! - Failure domain asimmetrico: errori per-task assorbiti dagli unit,
//!   transport failure (unit crashato) rigetta l'INTERO batch
//! - `terminate()`: ferma ogni unit incondizionatamente, senza drain
//!
//! ## Concorrenza:
//! Gli unit non condividono stato mutabile: ognuno possiede il proprio chunk,
//! il pool possiede in esclusiva l'arena dei risultati e i contatori. Tutta
//! la comunicazione passa per messaggi immutabili su canali mpsc.

mod unit;

pub use unit::{UnitCommand, UnitMessage};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::error::{OptimizeError, OptimizeResult};
use crate::optimize::{ImageOptimizer, OptimizationResult};
use crate::progress::{
    BatchStatus, DetailedProgressUpdate, ProgressReporter, ProgressThrottle, ProgressUpdate,
    WorkerPoolMetrics,
};
use crate::settings::ImageTask;
use unit::ExecutionUnit;

/// Outcome of one batch: results in input order plus distribution metrics.
#[derive(Debug)]
pub struct BatchOutput {
    pub results: Vec<OptimizationResult>,
    pub metrics: WorkerPoolMetrics,
}

struct WorkerHandle {
    commands: mpsc::UnboundedSender<UnitCommand>,
    join: JoinHandle<()>,
}

/// Fixed pool of persistent execution units, reused across batches.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    worker_count: usize,
    events: mpsc::UnboundedReceiver<UnitMessage>,
    // The pool keeps one sender so the event channel survives unit restarts
    // and stays open between batches.
    _events_tx: mpsc::UnboundedSender<UnitMessage>,
    throttle: ProgressThrottle,
    // Incremented per batch. The channel outlives a rejected batch, so units
    // still draining an aborted chunk keep sending; their messages carry an
    // older generation and are discarded.
    generation: u64,
}

impl WorkerPool {
    /// Eagerly spawns `worker_count` units (default: available CPU count).
    pub fn new(codec: Arc<dyn Codec>, worker_count: Option<usize>) -> OptimizeResult<Self> {
        let worker_count = worker_count.unwrap_or_else(num_cpus::get);
        if worker_count == 0 {
            return Err(OptimizeError::config("Worker count cannot be zero"));
        }
        debug!("Creating worker pool with {} workers", worker_count);

        let (events_tx, events) = mpsc::unbounded_channel();
        let workers = (0..worker_count)
            .map(|worker_id| {
                let optimizer = ImageOptimizer::new(codec.clone());
                let (commands, join) =
                    ExecutionUnit::spawn(worker_id, optimizer, events_tx.clone());
                WorkerHandle { commands, join }
            })
            .collect();

        Ok(Self {
            workers,
            worker_count,
            events,
            _events_tx: events_tx,
            throttle: ProgressThrottle::new(),
            generation: 0,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Processes a batch, returning results in input order.
    ///
    /// Per-task failures come back as failed results at their original index;
    /// a transport failure in any unit rejects the whole batch, discarding
    /// results already produced by other units.
    pub async fn process_batch(
        &mut self,
        tasks: Vec<ImageTask>,
        reporter: &dyn ProgressReporter,
    ) -> OptimizeResult<BatchOutput> {
        if self.workers.is_empty() {
            return Err(OptimizeError::config("Worker pool has been terminated"));
        }

        let total_tasks = tasks.len();
        let mut tasks_per_worker = vec![0usize; self.worker_count];
        if total_tasks == 0 {
            return Ok(BatchOutput {
                results: Vec::new(),
                metrics: WorkerPoolMetrics {
                    worker_count: self.worker_count,
                    tasks_per_worker,
                },
            });
        }

        info!(
            "Processing batch of {} tasks with {} workers",
            total_tasks, self.worker_count
        );

        self.generation += 1;
        let generation = self.generation;

        let chunk_size = (total_tasks + self.worker_count - 1) / self.worker_count;
        let mut dispatched = 0usize;
        for (worker_id, chunk) in tasks.chunks(chunk_size).enumerate() {
            tasks_per_worker[worker_id] = chunk.len();
            self.workers[worker_id]
                .commands
                .send(UnitCommand::Process {
                    generation,
                    tasks: chunk.to_vec(),
                })
                .map_err(|_| {
                    OptimizeError::transport(format!("Worker {worker_id} is not accepting work"))
                })?;
            dispatched += 1;
        }
        debug!(
            "Dispatched {} chunks of up to {} tasks",
            dispatched, chunk_size
        );

        // Results arena indexed by worker*chunk_size + local position; this
        // fixed formula, not arrival order, preserves input ordering.
        let mut slots: Vec<Option<OptimizationResult>> = vec![None; total_tasks];
        let mut completed_tasks = 0usize;
        let mut pending_chunks = dispatched;
        self.throttle.reset();

        while pending_chunks > 0 {
            let message = self.events.recv().await.ok_or_else(|| {
                OptimizeError::transport("Event channel closed while batch in flight")
            })?;

            // Late messages from a previously rejected batch are dropped
            // here; mixing them in would corrupt counters and the arena.
            if message.generation() != generation {
                debug!(
                    "Discarding stale message from batch {} (current {})",
                    message.generation(),
                    generation
                );
                continue;
            }

            match message {
                UnitMessage::Progress { message: progress, .. } => {
                    reporter.progress(&progress);
                    if progress.is_terminal() {
                        completed_tasks += 1;
                        if let crate::progress::ProgressMessage::Complete { result, .. } =
                            &progress
                        {
                            reporter.detailed_progress(&DetailedProgressUpdate::from_result(
                                result,
                                completed_tasks,
                                total_tasks,
                            ));
                        }
                        if let Some(update) = self.throttle.tick(completed_tasks, total_tasks) {
                            reporter.progress_update(&update);
                        }
                    }
                }
                UnitMessage::Results {
                    worker_id, results, ..
                } => {
                    for (local_index, result) in results.into_iter().enumerate() {
                        let global_index = worker_id * chunk_size + local_index;
                        slots[global_index] = Some(result);
                    }
                    pending_chunks -= 1;
                }
                UnitMessage::Fatal {
                    worker_id, error, ..
                } => {
                    warn!("Worker {} failed, rejecting batch: {}", worker_id, error);
                    reporter.progress_update(&ProgressUpdate {
                        completed_tasks,
                        total_tasks,
                        progress_percentage: completed_tasks * 100 / total_tasks,
                        status: BatchStatus::Error,
                    });
                    return Err(OptimizeError::transport(format!(
                        "Worker {worker_id} crashed: {error}"
                    )));
                }
            }
        }

        if completed_tasks < total_tasks {
            warn!(
                "Batch finished with {}/{} terminal progress events",
                completed_tasks, total_tasks
            );
        }

        // Every slot should be filled; unfilled ones are dropped defensively.
        let results: Vec<OptimizationResult> = slots.into_iter().flatten().collect();
        info!("Batch complete: {} results", results.len());

        Ok(BatchOutput {
            results,
            metrics: WorkerPoolMetrics {
                worker_count: self.worker_count,
                tasks_per_worker,
            },
        })
    }

    /// Stops every unit unconditionally. No drain is attempted: in-flight
    /// chunks are abandoned.
    pub fn terminate(&mut self) {
        info!("Terminating worker pool ({} workers)", self.workers.len());
        for worker in self.workers.drain(..) {
            worker.join.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ImageMeta;
    use crate::formats::{EncodeParams, ImageFormat};
    use crate::progress::{NullReporter, ProgressMessage, ProgressUpdate};
    use crate::resize::ResizeTarget;
    use crate::settings::ImageSettings;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Codec double: fixed metadata, output half the input size. Inputs whose
    /// file name contains "poison" panic after a short delay, simulating a
    /// crash outside the per-task error boundary; "slow" inputs stall before
    /// completing, so their messages outlive a rejected batch.
    struct TestCodec;

    impl Codec for TestCodec {
        fn probe(&self, path: &Path) -> OptimizeResult<ImageMeta> {
            let name = path.to_string_lossy().into_owned();
            if name.contains("poison") {
                std::thread::sleep(Duration::from_millis(100));
                panic!("poisoned task");
            }
            if name.contains("slow") {
                std::thread::sleep(Duration::from_millis(300));
            }
            Ok(ImageMeta {
                format: ImageFormat::Png,
                width: 100,
                height: 100,
            })
        }

        fn transcode(
            &self,
            input: &Path,
            output: &Path,
            _resize: Option<ResizeTarget>,
            _params: &EncodeParams,
        ) -> OptimizeResult<()> {
            let len = std::fs::metadata(input).map_err(OptimizeError::Io)?.len();
            std::fs::write(output, vec![0u8; (len / 2).max(1) as usize])
                .map_err(OptimizeError::Io)
        }
    }

    /// Reporter collecting every event for assertions.
    #[derive(Default)]
    struct RecordingReporter {
        progress: Mutex<Vec<String>>,
        updates: Mutex<Vec<ProgressUpdate>>,
        detailed: Mutex<usize>,
    }

    impl ProgressReporter for RecordingReporter {
        fn progress(&self, message: &ProgressMessage) {
            let kind = match message {
                ProgressMessage::Start { .. } => "start",
                ProgressMessage::Complete { .. } => "complete",
                ProgressMessage::Error { .. } => "error",
            };
            self.progress
                .lock()
                .unwrap()
                .push(format!("{kind}:{}", message.file_name()));
        }

        fn progress_update(&self, update: &ProgressUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }

        fn detailed_progress(&self, _update: &DetailedProgressUpdate) {
            *self.detailed.lock().unwrap() += 1;
        }
    }

    fn make_tasks(dir: &Path, names: &[&str]) -> Vec<ImageTask> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let input = dir.join(name);
                // Distinct sizes so each result is attributable to its task.
                std::fs::write(&input, vec![1u8; 100 * (i + 1)]).unwrap();
                ImageTask {
                    input_path: input.to_string_lossy().into_owned(),
                    output_path: dir
                        .join(format!("out_{name}"))
                        .to_string_lossy()
                        .into_owned(),
                    settings: ImageSettings::default(),
                }
            })
            .collect()
    }

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(Arc::new(TestCodec), Some(workers)).unwrap()
    }

    #[test]
    fn test_zero_workers_rejected() {
        // Rejected before any unit is spawned, so no runtime is needed.
        assert!(WorkerPool::new(Arc::new(TestCodec), Some(0)).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_preserve_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = make_tasks(dir.path(), &["a.png", "b.png", "c.png", "d.png"]);
        let mut pool = pool(2);

        let output = pool
            .process_batch(tasks.clone(), &NullReporter)
            .await
            .unwrap();

        // N=4, W=2 -> chunk_size=2: worker 0 owns indices {0,1}, worker 1
        // owns {2,3}; results line up with the input regardless of which
        // worker finished first.
        assert_eq!(output.results.len(), 4);
        for (k, task) in tasks.iter().enumerate() {
            assert_eq!(output.results[k].file_name, task.file_name());
            assert_eq!(output.results[k].original_size, 100 * (k as u64 + 1));
            assert!(output.results[k].success);
        }
        assert_eq!(output.metrics.worker_count, 2);
        assert_eq!(output.metrics.tasks_per_worker, vec![2, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_more_workers_than_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = make_tasks(dir.path(), &["a.png", "b.png"]);
        let mut pool = pool(4);

        let output = pool.process_batch(tasks, &NullReporter).await.unwrap();

        // chunk_size = ceil(2/4) = 1: two chunks dispatched, trailing
        // workers stay idle.
        assert_eq!(output.results.len(), 2);
        assert_eq!(output.metrics.tasks_per_worker, vec![1, 1, 0, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_task_failures_are_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = make_tasks(dir.path(), &["a.png", "b.png", "c.png"]);
        // Missing input: task-level validation failure, batch still resolves.
        tasks[1].input_path = dir.path().join("missing.png").to_string_lossy().into_owned();

        let reporter = RecordingReporter::default();
        let mut pool = pool(2);
        let output = pool.process_batch(tasks, &reporter).await.unwrap();

        assert_eq!(output.results.len(), 3);
        assert!(output.results[0].success);
        assert!(!output.results[1].success);
        assert!(output.results[2].success);

        let events = reporter.progress.lock().unwrap();
        assert!(events.iter().any(|e| e == "error:missing.png"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transport_failure_rejects_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        // W=2, N=4: worker 0 gets the poisoned chunk and crashes after a
        // delay, worker 1 has long since returned its valid results. The
        // batch must still reject.
        let tasks = make_tasks(dir.path(), &["poison.png", "b.png", "c.png", "d.png"]);
        let reporter = RecordingReporter::default();
        let mut pool = pool(2);

        let err = pool.process_batch(tasks, &reporter).await.unwrap_err();
        assert!(matches!(err, OptimizeError::Transport(_)));
        assert!(err.to_string().contains("poisoned task"));

        // The last aggregate update announces the rejection.
        let updates = reporter.updates.lock().unwrap();
        assert_eq!(updates.last().unwrap().status, BatchStatus::Error);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rejected_batch_does_not_leak_into_next() {
        let dir = tempfile::tempdir().unwrap();
        // W=2: worker 0 crashes almost immediately, worker 1 is still deep
        // in its slow chunk when the batch rejects. Its late progress and
        // results messages must not be attributed to the follow-up batch.
        let doomed = make_tasks(
            dir.path(),
            &["poison.png", "b.png", "slow1.png", "slow2.png"],
        );
        let mut pool = pool(2);
        let err = pool.process_batch(doomed, &NullReporter).await.unwrap_err();
        assert!(matches!(err, OptimizeError::Transport(_)));

        // Re-submit while worker 1 is still draining the aborted chunk.
        let retry = make_tasks(dir.path(), &["slow3.png", "slow4.png"]);
        let reporter = RecordingReporter::default();
        let output = pool.process_batch(retry, &reporter).await.unwrap();

        assert_eq!(output.results.len(), 2);
        assert!(output.results[0].file_name.contains("slow3"));
        assert!(output.results[1].file_name.contains("slow4"));
        assert!(output.results.iter().all(|r| r.success));

        // Only the retry's own completions were counted.
        let events = reporter.progress.lock().unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.starts_with("complete:"))
                .count(),
            2
        );
        assert!(events.iter().all(|e| !e.contains("slow1") && !e.contains("slow2")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_batch_resolves_immediately() {
        let mut pool = pool(2);
        let output = pool.process_batch(Vec::new(), &NullReporter).await.unwrap();
        assert!(output.results.is_empty());
        assert_eq!(output.metrics.tasks_per_worker, vec![0, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_throttled_updates_hit_milestones_only() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..10).map(|i| format!("img{i}.png")).collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let tasks = make_tasks(dir.path(), &name_refs);

        let reporter = RecordingReporter::default();
        // Single worker: strictly sequential completions, well under 500ms.
        let mut pool = pool(1);
        pool.process_batch(tasks, &reporter).await.unwrap();

        let percentages: Vec<usize> = reporter
            .updates
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.progress_percentage)
            .collect();
        assert_eq!(percentages, vec![50, 100]);
        assert_eq!(*reporter.detailed.lock().unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_is_reusable_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = pool(2);

        let first = make_tasks(dir.path(), &["a.png", "b.png"]);
        let second = make_tasks(dir.path(), &["c.png", "d.png", "e.png"]);

        let out1 = pool.process_batch(first, &NullReporter).await.unwrap();
        let out2 = pool.process_batch(second, &NullReporter).await.unwrap();
        assert_eq!(out1.results.len(), 2);
        assert_eq!(out2.results.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_terminated_pool_rejects_batches() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = make_tasks(dir.path(), &["a.png"]);
        let mut pool = pool(2);

        pool.terminate();
        let err = pool.process_batch(tasks, &NullReporter).await.unwrap_err();
        assert!(matches!(err, OptimizeError::Config(_)));
    }
}
