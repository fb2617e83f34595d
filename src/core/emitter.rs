//! Metric emission to the monitoring backend.
//!
//! The `Emitter` turns one acquired value into a `Metric` and hands it to a
//! `MonitoringSink`. The stock sink shells out to `zabbix_sender`, one
//! invocation per concrete submode value, and reports a non-zero exit status
//! as a dispatch error.

use std::{process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::indicators::{
    error::IndicatorError,
    types::{DataType, IndicatorResult},
    value::{Payload, Value},
};
use crate::config::sender::SenderConfig;

/// One `(key, value, host)` sample ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub key: String,
    pub payload: Payload,
    pub host: String,
}

/// Destination of emitted metrics.
///
/// Delivery is at most once per call; failures must surface as an error.
#[async_trait]
pub trait MonitoringSink: Send + Sync {
    async fn dispatch(&self, metric: &Metric) -> IndicatorResult<()>;
}

/// Sink that runs the `zabbix_sender` binary.
pub struct ZabbixSender {
    config: SenderConfig,
}

impl ZabbixSender {
    pub fn new(config: SenderConfig) -> Self {
        ZabbixSender { config }
    }

    fn args(&self, metric: &Metric) -> Vec<String> {
        let mut args = vec!["-z".to_string(), self.config.server.clone()];
        if let Some(port) = self.config.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.extend([
            "-s".to_string(),
            metric.host.clone(),
            "-k".to_string(),
            metric.key.clone(),
            "-o".to_string(),
            metric.payload.as_arg().to_string(),
        ]);
        args
    }

    /// Shell rendering of the invocation, for logs.
    pub fn command_line(&self, metric: &Metric) -> String {
        let mut line = format!("{} -z {}", self.config.command, self.config.server);
        if let Some(port) = self.config.port {
            line.push_str(&format!(" -p {}", port));
        }
        line.push_str(&format!(
            " -s {} -k {} -o {}",
            Payload::Text(metric.host.clone()).to_shell(),
            metric.key,
            metric.payload.to_shell()
        ));
        line
    }
}

#[async_trait]
impl MonitoringSink for ZabbixSender {
    async fn dispatch(&self, metric: &Metric) -> IndicatorResult<()> {
        let line = self.command_line(metric);
        if self.config.verbose {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }

        let output = Command::new(&self.config.command)
            .args(self.args(metric))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| IndicatorError::SenderUnreachable {
                command: self.config.command.clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim());
        }

        if self.config.verbose {
            info!("{}", text);
        } else {
            debug!("{}", text);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(IndicatorError::Dispatch {
                key: metric.key.clone(),
                status: output.status.code().unwrap_or(-1),
                output: text,
            })
        }
    }
}

/// Formats and dispatches values for a fixed monitored host.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn MonitoringSink>,
    host: String,
}

impl Emitter {
    pub fn new(sink: Arc<dyn MonitoringSink>, host: impl Into<String>) -> Self {
        Emitter {
            sink,
            host: host.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Builds the metric for `key` and dispatches it. Errors are logged here and
    /// returned so the caller can count them.
    pub async fn emit(&self, key: &str, datatype: DataType, value: &Value) -> IndicatorResult<()> {
        let metric = Metric {
            key: key.to_string(),
            payload: Payload::encode(datatype, value),
            host: self.host.clone(),
        };
        self.sink.dispatch(&metric).await.inspect_err(|e| {
            error!("Dispatch failed for '{}': {}", key, e);
        })
    }
}
