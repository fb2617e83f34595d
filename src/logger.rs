//! Logging initialization.
//!
//! `LoggerManager` validates the logging configuration and installs the
//! global `tracing` subscriber: a console layer in compact, pretty or JSON
//! form, and optionally a systemd journald layer.

use std::io;

use thiserror::Error;
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, prelude::*, util::TryInitError, EnvFilter, Layer, Registry,
};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, JournaldConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger initialization error: {0}")]
    InitializationError(String),

    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// IO error, typically while connecting to the journald socket.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald was requested alongside the console and failed to start.
    #[error("Failed to initialize journald logger while console output is enabled")]
    JournaldFailedWithConsoleEnabled,
}

impl From<TryInitError> for LoggerError {
    fn from(e: TryInitError) -> Self {
        LoggerError::InitializationError(e.to_string())
    }
}

pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Validates `config`.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Call once, before the first scheduled run.
    ///
    /// # Errors
    ///
    /// Fails when no layer could be built, when journald fails while the
    /// console is also enabled, or when a global subscriber already exists.
    pub fn init(&self) -> Result<(), LoggerError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if let Some(console) = self.config.console.as_ref().filter(|c| c.enabled) {
            layers.push(console_layer(console, self.filter()));
        }

        if let Some(journald) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match journald_layer(journald, self.filter()) {
                Ok(layer) => {
                    layers.push(layer);
                    print_info!(
                        "Systemd journald logger initialized with identifier: {}",
                        journald.identifier
                    );
                }
                Err(e) => {
                    print_warn!("Failed to initialize systemd journald logger: {}", e);
                    if self.config.console.as_ref().is_some_and(|c| c.enabled) {
                        return Err(LoggerError::JournaldFailedWithConsoleEnabled);
                    }
                }
            }
        }

        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }

        tracing_subscriber::registry().with(layers).try_init()?;
        Ok(())
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }
}

fn console_layer(config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
    let spans = if config.show_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_span_events(spans)
        .with_ansi(config.ansi_colors)
        .with_writer(io::stderr);

    match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    }
}

fn journald_layer(config: &JournaldConfig, filter: EnvFilter) -> Result<BoxedLayer, LoggerError> {
    let layer = tracing_journald::layer()?.with_syslog_identifier(config.identifier.clone());
    Ok(layer.with_filter(filter).boxed())
}
