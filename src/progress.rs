//! # Progress Protocol Module
//!
//! Questo modulo definisce le forme dei messaggi di progresso condivise tra
//! execution unit e worker pool, e la policy di throttling degli update.
//!
//! ## Responsabilità:
//! - `ProgressMessage`: tagged union start/complete/error per singolo task
//! - `ProgressUpdate`: aggregato throttled per la progress bar
//! - `DetailedProgressUpdate`: metriche per-file + percentuale batch
//! - `ProgressThrottle`: stato per-istanza (ultima percentuale, ultimo emit)
//! - `ProgressReporter`: sink verso cui pool e CLI emettono gli eventi
//!
//! ## Policy di throttling:
//! Un update viene emesso solo se la percentuale è aumentata E (sono passati
//! almeno 500ms dall'ultimo emit OPPURE la percentuale è un multiplo di 25 o
//! vale 100). Le milestone 25/50/75/100 non vengono mai perse; fuori dalle
//! milestone non si supera un update ogni 500ms.
//!
//! Lo stato del throttle appartiene all'istanza del pool, non al processo:
//! pool concorrenti non interferiscono tra loro.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::optimize::OptimizationResult;

/// Minimum interval between non-milestone progress updates.
pub const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Per-task progress message emitted by an execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "progressType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ProgressMessage {
    Start {
        task_id: String,
        worker_id: usize,
        file_name: String,
    },
    Complete {
        task_id: String,
        worker_id: usize,
        file_name: String,
        result: OptimizationResult,
        formatted_message: String,
    },
    Error {
        task_id: String,
        worker_id: usize,
        file_name: String,
        error: String,
    },
}

impl ProgressMessage {
    pub fn worker_id(&self) -> usize {
        match self {
            ProgressMessage::Start { worker_id, .. }
            | ProgressMessage::Complete { worker_id, .. }
            | ProgressMessage::Error { worker_id, .. } => *worker_id,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ProgressMessage::Start { file_name, .. }
            | ProgressMessage::Complete { file_name, .. }
            | ProgressMessage::Error { file_name, .. } => file_name,
        }
    }

    /// True for complete/error messages, the ones that advance the batch count.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressMessage::Start { .. })
    }
}

/// Batch status carried by aggregate updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Complete,
    Error,
}

/// Throttled aggregate update for progress bars / frontends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub completed_tasks: usize,
    pub total_tasks: usize,
    pub progress_percentage: usize,
    pub status: BatchStatus,
}

/// Per-file optimization metrics inside a detailed update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    pub original_size: u64,
    pub optimized_size: u64,
    pub saved_bytes: i64,
    pub compression_ratio: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// Batch progress metrics inside a detailed update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub completed_tasks: usize,
    pub total_tasks: usize,
    pub progress_percentage: usize,
}

/// Per-file metrics combined with batch percentage, emitted on completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedProgressUpdate {
    pub file_name: String,
    pub task_id: String,
    pub optimization_metrics: OptimizationMetrics,
    pub batch_metrics: BatchProgress,
    pub formatted_message: String,
}

impl DetailedProgressUpdate {
    pub fn from_result(
        result: &OptimizationResult,
        completed_tasks: usize,
        total_tasks: usize,
    ) -> Self {
        let progress_percentage = percentage(completed_tasks, total_tasks);
        Self {
            file_name: result.file_name.clone(),
            task_id: result.path.clone(),
            optimization_metrics: OptimizationMetrics {
                original_size: result.original_size,
                optimized_size: result.optimized_size,
                saved_bytes: result.saved_bytes,
                compression_ratio: result.compression_ratio.clone(),
                format: result.format.clone(),
            },
            batch_metrics: BatchProgress {
                completed_tasks,
                total_tasks,
                progress_percentage,
            },
            formatted_message: format!(
                "{} - Progress: {}% ({}/{})",
                result.summary(),
                progress_percentage,
                completed_tasks,
                total_tasks
            ),
        }
    }
}

/// Descriptive per-batch summary of how tasks were distributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolMetrics {
    pub worker_count: usize,
    /// Chunk length handled by each worker, in worker order (0 for idle units)
    pub tasks_per_worker: Vec<usize>,
}

fn percentage(completed: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        completed * 100 / total
    }
}

/// Throttling state for aggregate progress updates. One instance per pool.
#[derive(Debug)]
pub struct ProgressThrottle {
    last_percentage: usize,
    last_emit: Instant,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::with_interval(PROGRESS_MIN_INTERVAL)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            last_percentage: 0,
            last_emit: Instant::now(),
            min_interval,
        }
    }

    /// Resets the state at the start of a batch.
    pub fn reset(&mut self) {
        self.last_percentage = 0;
        self.last_emit = Instant::now();
    }

    /// Applies the throttling rule to the new completion count.
    ///
    /// Returns the update to emit, or `None` when it is suppressed. On
    /// emission both the percentage and the timestamp state are updated.
    pub fn tick(&mut self, completed_tasks: usize, total_tasks: usize) -> Option<ProgressUpdate> {
        let current = percentage(completed_tasks, total_tasks);
        if current <= self.last_percentage {
            return None;
        }

        let now = Instant::now();
        let interval_ok = now.duration_since(self.last_emit) >= self.min_interval;
        let milestone = current % 25 == 0 || current == 100;
        if !interval_ok && !milestone {
            return None;
        }

        self.last_percentage = current;
        self.last_emit = now;
        Some(ProgressUpdate {
            completed_tasks,
            total_tasks,
            progress_percentage: current,
            status: if completed_tasks >= total_tasks {
                BatchStatus::Complete
            } else {
                BatchStatus::Processing
            },
        })
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink for progress events produced while a batch runs.
pub trait ProgressReporter: Send + Sync {
    fn progress(&self, message: &ProgressMessage);
    fn progress_update(&self, update: &ProgressUpdate);
    fn detailed_progress(&self, update: &DetailedProgressUpdate);
}

/// Reporter that drops every event. Useful for library callers and tests.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn progress(&self, _message: &ProgressMessage) {}
    fn progress_update(&self, _update: &ProgressUpdate) {}
    fn detailed_progress(&self, _update: &DetailedProgressUpdate) {}
}

/// Human-facing reporter backed by an indicatif progress bar.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(total_tasks: u64) -> Self {
        let bar = ProgressBar::new(total_tasks);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Finish with a final summary message.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl ProgressReporter for ConsoleReporter {
    fn progress(&self, message: &ProgressMessage) {
        match message {
            ProgressMessage::Start { .. } => {}
            ProgressMessage::Complete { result, .. } => {
                self.bar.inc(1);
                self.bar.set_message(format!(
                    "[OK] {}: {}% saved",
                    result.file_name, result.compression_ratio
                ));
            }
            ProgressMessage::Error {
                file_name, error, ..
            } => {
                self.bar.inc(1);
                self.bar
                    .set_message(format!("[ERROR] {file_name}: {error}"));
            }
        }
    }

    fn progress_update(&self, _update: &ProgressUpdate) {
        // The bar already renders percentage from its own position.
    }

    fn detailed_progress(&self, _update: &DetailedProgressUpdate) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(throttle: &mut ProgressThrottle, total: usize) -> Vec<usize> {
        let mut emitted = Vec::new();
        for completed in 1..=total {
            if let Some(update) = throttle.tick(completed, total) {
                emitted.push(update.progress_percentage);
            }
        }
        emitted
    }

    #[test]
    fn test_only_milestones_without_delay() {
        // 10 rapid completions: percentages 10..100, milestones are 50 and 100.
        let mut throttle = ProgressThrottle::new();
        assert_eq!(drain(&mut throttle, 10), vec![50, 100]);
    }

    #[test]
    fn test_quarter_milestones_never_dropped() {
        let mut throttle = ProgressThrottle::new();
        assert_eq!(drain(&mut throttle, 4), vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_final_update_always_emitted() {
        let mut throttle = ProgressThrottle::new();
        let update = throttle.tick(3, 3).unwrap();
        assert_eq!(update.progress_percentage, 100);
        assert_eq!(update.status, BatchStatus::Complete);
    }

    #[test]
    fn test_zero_interval_emits_every_increase() {
        let mut throttle = ProgressThrottle::with_interval(Duration::ZERO);
        assert_eq!(
            drain(&mut throttle, 10),
            vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
        );
    }

    #[test]
    fn test_unchanged_percentage_suppressed() {
        let mut throttle = ProgressThrottle::with_interval(Duration::ZERO);
        // 1/200 and 2/200 both floor to the same percentage bucket.
        assert!(throttle.tick(2, 200).is_some());
        assert!(throttle.tick(3, 200).is_none());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut throttle = ProgressThrottle::with_interval(Duration::ZERO);
        assert!(throttle.tick(4, 4).is_some());
        assert!(throttle.tick(4, 4).is_none());
        throttle.reset();
        assert!(throttle.tick(4, 4).is_some());
    }

    #[test]
    fn test_instances_do_not_interfere() {
        let mut a = ProgressThrottle::with_interval(Duration::ZERO);
        let mut b = ProgressThrottle::with_interval(Duration::ZERO);
        assert!(a.tick(1, 2).is_some());
        assert!(b.tick(1, 2).is_some());
    }

    #[test]
    fn test_progress_message_wire_shape() {
        let message = ProgressMessage::Start {
            task_id: "/in/a.png".to_string(),
            worker_id: 3,
            file_name: "a.png".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["progressType"], "start");
        assert_eq!(json["taskId"], "/in/a.png");
        assert_eq!(json["workerId"], 3);
        assert_eq!(json["fileName"], "a.png");
    }

    #[test]
    fn test_progress_update_wire_shape() {
        let update = ProgressUpdate {
            completed_tasks: 5,
            total_tasks: 10,
            progress_percentage: 50,
            status: BatchStatus::Processing,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["completedTasks"], 5);
        assert_eq!(json["progressPercentage"], 50);
        assert_eq!(json["status"], "processing");
    }
}
