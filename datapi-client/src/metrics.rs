//! Runner metrics
//!
//! OpenTelemetry instruments recorded by the
//! [`CommandRunner`](crate::CommandRunner) when metrics are enabled on its
//! builder. They go to the global meter provider, which
//! `datapi_core::init_observability` points at the OTLP exporter.
//!
//! # Metrics Collected
//!
//! - **datapi.runner.commands.total**: commands run, by name and outcome
//! - **datapi.runner.command.duration**: end to end latency in seconds
//! - **datapi.runner.errors.total**: failed commands, by error kind
//! - **datapi.runner.attempts**: HTTP attempts per command
//! - **datapi.runner.warnings.total**: warnings returned by the server

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Instruments recorded per command
pub struct RunnerMetrics {
    /// Commands run
    pub commands_total: Counter<u64>,
    /// Command duration in seconds
    pub command_duration: Histogram<f64>,
    /// Failed commands
    pub errors_total: Counter<u64>,
    /// HTTP attempts per command
    pub attempts: Histogram<u64>,
    /// Server warnings
    pub warnings_total: Counter<u64>,
}

impl RunnerMetrics {
    /// Instruments on the global `datapi` meter
    pub fn new() -> Self {
        Self::new_with_meter(&global::meter("datapi"))
    }

    /// Instruments on a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            commands_total: meter
                .u64_counter("datapi.runner.commands.total")
                .with_description("Total number of commands run")
                .build(),
            command_duration: meter
                .f64_histogram("datapi.runner.command.duration")
                .with_description("Command duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("datapi.runner.errors.total")
                .with_description("Total number of failed commands")
                .build(),
            attempts: meter
                .u64_histogram("datapi.runner.attempts")
                .with_description("HTTP attempts made per command")
                .build(),
            warnings_total: meter
                .u64_counter("datapi.runner.warnings.total")
                .with_description("Total number of warnings returned by the Data API")
                .build(),
        }
    }

    /// Record a finished command
    pub fn record_command(&self, command: &str, outcome: &str, duration_secs: f64, attempts: u32) {
        let attributes = &[
            KeyValue::new("command", command.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.commands_total.add(1, attributes);
        self.command_duration.record(duration_secs, attributes);
        self.attempts
            .record(u64::from(attempts), &[KeyValue::new("command", command.to_string())]);
    }

    /// Record a failed command
    pub fn record_error(&self, command: &str, kind: &str) {
        let attributes = &[
            KeyValue::new("command", command.to_string()),
            KeyValue::new("error_kind", kind.to_string()),
        ];
        self.errors_total.add(1, attributes);
    }

    /// Record a server warning
    pub fn record_warning(&self, command: &str) {
        let attributes = &[KeyValue::new("command", command.to_string())];
        self.warnings_total.add(1, attributes);
    }
}

impl Default for RunnerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunnerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = RunnerMetrics::new();

        // Recording against the no-op global provider must not panic
        metrics.record_command("insertOne", "success", 0.05, 1);
        metrics.record_error("insertOne", "transport");
        metrics.record_warning("find");
    }

    #[test]
    fn test_metrics_with_meter() {
        let meter = global::meter("datapi-test");
        let metrics = RunnerMetrics::new_with_meter(&meter);
        metrics.record_command("find", "error", 1.2, 3);
        metrics.record_error("find", "application");
    }
}
