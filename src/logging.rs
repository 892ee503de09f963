//! Progress and metric sinks for the training and evaluation drivers.
//!
//! The drivers never talk to a concrete logging backend. They emit formatted
//! progress lines and named scalars through [`RunLogger`], and callers decide
//! where those go: the process logger ([`LogSink`]), an in-memory buffer for
//! tests and notebooks ([`MemoryLogger`]), or nowhere ([`NullLogger`]).

use log::{debug, info};

/// Sink for driver output: human-readable progress lines plus scalar metrics
/// keyed by name and a monotonically increasing step.
pub trait RunLogger {
    /// Record a formatted progress line.
    fn line(&mut self, text: &str);

    /// Record a scalar metric at a step. Steps for a given name are emitted
    /// in strictly increasing order by the drivers.
    fn scalar(&mut self, name: &str, step: usize, value: f64);
}

/// Routes progress lines to `log::info!` and scalars to `log::debug!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl RunLogger for LogSink {
    fn line(&mut self, text: &str) {
        info!(target: "text_mapping_fewshot", "{text}");
    }

    fn scalar(&mut self, name: &str, step: usize, value: f64) {
        debug!(target: "text_mapping_fewshot", "{name}[{step}] = {value}");
    }
}

/// Captures everything in memory. Used by tests to assert on driver output.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogger {
    /// Progress lines in emission order.
    pub lines: Vec<String>,
    /// `(name, step, value)` scalar records in emission order.
    pub scalars: Vec<(String, usize, f64)>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalar values recorded under `name`, in emission order.
    pub fn scalar_values(&self, name: &str) -> Vec<f64> {
        self.scalars
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, _, v)| *v)
            .collect()
    }
}

impl RunLogger for MemoryLogger {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn scalar(&mut self, name: &str, step: usize, value: f64) {
        self.scalars.push((name.to_string(), step, value));
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl RunLogger for NullLogger {
    fn line(&mut self, _text: &str) {}

    fn scalar(&mut self, _name: &str, _step: usize, _value: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_captures_in_order() {
        let mut logger = MemoryLogger::new();
        logger.line("first");
        logger.line("second");
        logger.scalar("loss", 1, 0.5);
        logger.scalar("loss", 2, 0.25);
        logger.scalar("lr", 2, 0.001);

        assert_eq!(logger.lines, vec!["first", "second"]);
        assert_eq!(logger.scalar_values("loss"), vec![0.5, 0.25]);
        assert_eq!(logger.scalar_values("lr"), vec![0.001]);
    }

    #[test]
    fn null_logger_accepts_everything() {
        let mut logger = NullLogger;
        logger.line("ignored");
        logger.scalar("ignored", 0, 0.0);
    }
}
