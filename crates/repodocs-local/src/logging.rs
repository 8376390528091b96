//! Default `Logger` (spec §6) for collaborators who want a narrower,
//! dependency-free sink without reaching into `tracing` themselves.

use repodocs_core::{LogLevel, Logger};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target = target, "{message}"),
            LogLevel::Info => tracing::info!(target = target, "{message}"),
            LogLevel::Warn => tracing::warn!(target = target, "{message}"),
            LogLevel::Error => tracing::error!(target = target, "{message}"),
        }
    }
}
