use crate::backend::ConnectionId;
use crate::monitor::types::*;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::fs as async_fs;
use tracing::{debug, info, warn};

/// Records backend operations and derives service health from them.
///
/// The monitor is created by the caller and shared with the scheduler
/// service. Its lock is held only while recording or reading bookkeeping,
/// never across an await point, so records can also be written from `Drop`.
#[derive(Debug)]
pub struct OperationMonitor {
    config: MonitorConfig,
    started: Instant,
    state: Mutex<MonitorState>,
}

#[derive(Debug, Default)]
struct MonitorState {
    history: VecDeque<OperationRecord>,
    total_operations: u64,
    total_errors: u64,
    error_counts: HashMap<String, u64>,
    durations: HashMap<String, VecDeque<f64>>,
}

impl OperationMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        debug!(
            "Operation monitor started (history {}, error threshold {:.0}%)",
            config.max_history,
            config.error_rate_threshold * 100.0
        );
        Self {
            config,
            started: Instant::now(),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Await `operation`, record its outcome and hand back its result unchanged.
    ///
    /// The record is written on every exit path: if the returned future is
    /// dropped before `operation` finishes (a caller's timeout, an aborted
    /// task) or `operation` panics, a failed record is written instead.
    pub async fn track_operation<T, E, F>(
        &self,
        operation_name: &str,
        connection_id: Option<&ConnectionId>,
        retry_count: u32,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: OperationError,
    {
        let mut tracking = TrackedOperation {
            monitor: self,
            operation_name,
            connection_id,
            retry_count,
            started_at: Utc::now(),
            clock: Instant::now(),
            finished: false,
        };
        let result = operation.await;
        tracking.finished = true;

        let elapsed = tracking.clock.elapsed();
        if elapsed > self.config.slow_operation_threshold {
            warn!(
                "Slow operation {} took {:.2}s (threshold {:.2}s)",
                operation_name,
                elapsed.as_secs_f64(),
                self.config.slow_operation_threshold.as_secs_f64()
            );
        }

        let outcome = match &result {
            Ok(_) => None,
            Err(e) => {
                warn!(
                    "Operation {} failed on attempt {}: {}",
                    operation_name,
                    retry_count + 1,
                    e
                );
                Some((e.to_string(), e.kind().to_string()))
            }
        };
        tracking.record(outcome);

        result
    }

    /// Record a failure that happened before an operation could run
    pub async fn record_failure<E: OperationError>(
        &self,
        operation_name: &str,
        retry_count: u32,
        error: &E,
    ) {
        let now = Utc::now();
        warn!(
            "Operation {} could not start on attempt {}: {}",
            operation_name,
            retry_count + 1,
            error
        );
        self.record(OperationRecord {
            operation_name: operation_name.to_string(),
            started_at: now,
            finished_at: now,
            duration_ms: 0.0,
            success: false,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            connection_id: None,
            retry_count,
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, record: OperationRecord) {
        let mut state = self.lock_state();

        state.total_operations += 1;
        if !record.success {
            state.total_errors += 1;
            *state
                .error_counts
                .entry(record.operation_name.clone())
                .or_insert(0) += 1;
        }

        let samples = state
            .durations
            .entry(record.operation_name.clone())
            .or_default();
        samples.push_back(record.duration_ms);
        while samples.len() > self.config.max_duration_samples {
            samples.pop_front();
        }

        state.history.push_back(record);
        while state.history.len() > self.config.max_history {
            state.history.pop_front();
        }
    }

    pub async fn health_status(&self) -> HealthSnapshot {
        let state = self.lock_state();
        self.health_from(&state)
    }

    fn health_from(&self, state: &MonitorState) -> HealthSnapshot {
        let mut issues = Vec::new();
        let mut status = HealthStatus::Healthy;
        let mut error_rate = 0.0;

        if state.history.is_empty() {
            issues.push("No operations recorded yet".to_string());
        } else {
            let failed = state.history.iter().filter(|r| !r.success).count();
            error_rate = failed as f64 / state.history.len() as f64;
            if error_rate > self.config.error_rate_threshold {
                status = HealthStatus::Unhealthy;
                issues.push(format!("High error rate: {:.1}%", error_rate * 100.0));
            }

            let recent_failures = state
                .history
                .iter()
                .rev()
                .take(self.config.recent_window)
                .filter(|r| !r.success)
                .count();
            if recent_failures >= self.config.recent_failure_threshold {
                if status == HealthStatus::Healthy {
                    status = HealthStatus::Degraded;
                }
                issues.push(format!(
                    "{} of the last {} operations failed",
                    recent_failures, self.config.recent_window
                ));
            }
        }

        let average_response_times_ms = state
            .durations
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(name, samples)| {
                let avg = samples.iter().sum::<f64>() / samples.len() as f64;
                (name.clone(), avg)
            })
            .collect();

        HealthSnapshot {
            status,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            total_operations: state.total_operations,
            total_errors: state.total_errors,
            error_rate,
            average_response_times_ms,
            issues,
            last_operation: state.history.back().cloned(),
        }
    }

    /// Aggregates for one operation name over the current history
    pub async fn operation_stats(&self, operation_name: &str) -> Option<OperationStats> {
        let state = self.lock_state();
        let records: Vec<&OperationRecord> = state
            .history
            .iter()
            .filter(|r| r.operation_name == operation_name)
            .collect();
        if records.is_empty() {
            return None;
        }

        let successful_calls = records.iter().filter(|r| r.success).count();
        let mut error_patterns = HashMap::new();
        for record in records.iter().filter(|r| !r.success) {
            let kind = record.error_kind.clone().unwrap_or_else(|| "Unknown".to_string());
            *error_patterns.entry(kind).or_insert(0) += 1;
        }

        let durations: Vec<f64> = records.iter().map(|r| r.duration_ms).collect();
        let stats = duration_stats(&durations);
        let slow_ms = self.config.slow_operation_threshold.as_secs_f64() * 1000.0;

        Some(OperationStats {
            operation_name: operation_name.to_string(),
            total_calls: records.len(),
            successful_calls,
            failed_calls: records.len() - successful_calls,
            success_rate: successful_calls as f64 / records.len() as f64,
            min_duration_ms: stats.min_ms,
            avg_duration_ms: stats.avg_ms,
            max_duration_ms: stats.max_ms,
            slow_operations: durations.iter().filter(|d| **d > slow_ms).count(),
            error_patterns,
        })
    }

    pub async fn history(&self) -> Vec<OperationRecord> {
        let state = self.lock_state();
        state.history.iter().cloned().collect()
    }

    pub async fn diagnostics_report(&self) -> DiagnosticsReport {
        let state = self.lock_state();
        let performance = state
            .durations
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(name, samples)| {
                let samples: Vec<f64> = samples.iter().copied().collect();
                (name.clone(), duration_stats(&samples))
            })
            .collect();

        DiagnosticsReport {
            exported_at: Utc::now(),
            health: self.health_from(&state),
            operation_history: state.history.iter().cloned().collect(),
            error_counts: state.error_counts.clone(),
            performance,
        }
    }

    /// Write a diagnostics report as JSON, gzip-compressed when the path ends in `.gz`
    pub async fn export_diagnostics(&self, path: &Path) -> Result<()> {
        let report = self.diagnostics_report().await;
        let json = serde_json::to_vec_pretty(&report)?;
        let bytes = if is_gzip(path) {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?
        } else {
            json
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            async_fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(path);
        async_fs::write(&temp_path, &bytes).await?;
        if let Err(e) = async_fs::rename(&temp_path, path).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        info!(
            "Exported diagnostics ({} operations) to {}",
            report.operation_history.len(),
            path.display()
        );
        Ok(())
    }

    /// Export diagnostics to the configured path, if any
    pub async fn shutdown(&self) -> Result<()> {
        match &self.config.diagnostics_path {
            Some(path) => self.export_diagnostics(path).await,
            None => {
                debug!("Operation monitor shut down without diagnostics export");
                Ok(())
            }
        }
    }
}

/// Scope of one tracked operation; records a failure if left unfinished
struct TrackedOperation<'a> {
    monitor: &'a OperationMonitor,
    operation_name: &'a str,
    connection_id: Option<&'a ConnectionId>,
    retry_count: u32,
    started_at: DateTime<Utc>,
    clock: Instant,
    finished: bool,
}

impl TrackedOperation<'_> {
    /// `outcome` is `None` on success, otherwise the error message and kind
    fn record(&self, outcome: Option<(String, String)>) {
        let (error_message, error_kind) = outcome.unzip();
        self.monitor.record(OperationRecord {
            operation_name: self.operation_name.to_string(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: self.clock.elapsed().as_secs_f64() * 1000.0,
            success: error_kind.is_none(),
            error_message,
            error_kind,
            connection_id: self.connection_id.cloned(),
            retry_count: self.retry_count,
        });
    }
}

impl Drop for TrackedOperation<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let (kind, message) = if std::thread::panicking() {
            (PANICKED_KIND, "operation panicked")
        } else {
            (CANCELLED_KIND, "operation was cancelled before completing")
        };
        warn!(
            "Operation {} on attempt {} did not complete: {}",
            self.operation_name,
            self.retry_count + 1,
            message
        );
        self.record(Some((message.to_string(), kind.to_string())));
    }
}

/// Read a report written by [`OperationMonitor::export_diagnostics`]
pub async fn load_diagnostics(path: &Path) -> Result<DiagnosticsReport> {
    let bytes = async_fs::read(path).await?;
    let json = if is_gzip(path) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut decoded)?;
        decoded
    } else {
        bytes
    };
    Ok(serde_json::from_slice(&json)?)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    PathBuf::from(temp)
}

fn duration_stats(samples: &[f64]) -> DurationStats {
    if samples.is_empty() {
        return DurationStats {
            samples: 0,
            min_ms: 0.0,
            avg_ms: 0.0,
            max_ms: 0.0,
        };
    }
    DurationStats {
        samples: samples.len(),
        min_ms: samples.iter().copied().fold(f64::INFINITY, f64::min),
        avg_ms: samples.iter().sum::<f64>() / samples.len() as f64,
        max_ms: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}
