// BayEOS Client - Durable frame queue and forwarder for edge telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-device writer/sender orchestration
//!
//! [`GatewayClient`] wires one [`QueueWriter`] and one [`QueueSender`] per
//! named device and runs each as independent worker threads. Writer and
//! sender of a device share nothing but a queue directory; the file-state
//! rename is the only synchronization, so either side can crash and restart
//! without a coordination protocol.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::frame::DataValues;
use crate::sender::QueueSender;
use crate::writer::QueueWriter;
use log::{error, info};
use std::collections::HashSet;
use std::path::PathBuf;
use std::thread::JoinHandle;

/// Producer callback of one device
///
/// `init` runs once before the writer loop starts; `read` is polled every
/// writer interval and returns the values to save, or `None` when there is
/// nothing this tick.
pub trait DataSource: Send {
    /// One-time setup before the writer loop starts
    fn init(&mut self, _writer: &mut QueueWriter) -> Result<()> {
        Ok(())
    }

    /// Produce the next values to save, if any
    fn read(&mut self) -> Option<DataValues>;
}

impl<F> DataSource for F
where
    F: FnMut() -> Option<DataValues> + Send,
{
    fn read(&mut self) -> Option<DataValues> {
        self()
    }
}

/// Runs a writer/sender pair per logical device
pub struct GatewayClient {
    names: Vec<String>,
    config: ClientConfig,
}

/// Replace path- and quote-hostile characters in a device name, collapsing
/// runs into a single underscore
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sub = false;
    for c in name.chars() {
        if matches!(c, '-' | '/' | '\\' | '"' | '\'') {
            if !last_was_sub {
                out.push('_');
                last_was_sub = true;
            }
        } else {
            out.push(c);
            last_was_sub = false;
        }
    }
    out
}

impl GatewayClient {
    /// Create a client for a set of device names
    ///
    /// Names must be non-empty and unique; each derives its own queue
    /// directory under the configured base path.
    pub fn new(names: Vec<String>, config: ClientConfig) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::Config("no device name given".to_string()));
        }
        let unique: HashSet<&String> = names.iter().collect();
        if unique.len() < names.len() {
            return Err(Error::Config("duplicate device names".to_string()));
        }
        Ok(Self { names, config })
    }

    fn device_dir(&self, name: &str) -> PathBuf {
        self.config.path.join(sanitize(name))
    }

    /// Sender name reported to the gateway; with more than one device the
    /// configured sender (or the host name) becomes a path prefix
    fn sender_name(&self, name: &str) -> String {
        if self.names.len() <= 1 {
            return self
                .config
                .sender
                .clone()
                .unwrap_or_else(|| name.to_string());
        }
        let prefix = self.config.sender.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|host| host.into_string().ok())
                .unwrap_or_else(|| "bayeos-client".to_string())
        });
        format!("{}/{}", prefix, name)
    }

    fn make_writer(&self, dir: &PathBuf) -> Result<QueueWriter> {
        Ok(
            QueueWriter::new(dir, self.config.max_chunk, self.config.max_time)?
                .with_value_type(self.config.value_type),
        )
    }

    /// Spawn one writer thread and one sender thread per device
    ///
    /// Construction failures (queue directory, credentials) surface before
    /// any thread starts. The returned handles never join on their own; the
    /// loops run until the process ends.
    pub fn run<S, F>(self, mut source_factory: F) -> Result<Vec<JoinHandle<()>>>
    where
        S: DataSource + 'static,
        F: FnMut(&str) -> S,
    {
        let mut handles = Vec::with_capacity(self.names.len() * 2);
        for name in &self.names {
            let dir = self.device_dir(name);
            let mut writer = self.make_writer(&dir)?;
            let sender =
                QueueSender::new(self.config.sender_config(&dir, self.sender_name(name)))?;

            handles.push(sender.start(self.config.sender_sleep));

            let mut source = source_factory(name);
            let name = name.clone();
            let interval = self.config.writer_sleep;
            handles.push(std::thread::spawn(move || {
                info!("Started writer for {}", name);
                if let Err(err) = source.init(&mut writer) {
                    error!("Source init for {} failed: {}", name, err);
                }
                if let Err(err) =
                    writer.save_message(&format!("Started writer for {}", name), false, None, None)
                {
                    error!("{}", err);
                }
                loop {
                    if let Some(values) = source.read() {
                        if let Err(err) = writer.save(values, 0, None, None) {
                            error!("Saving data for {} failed: {}", name, err);
                        }
                    }
                    std::thread::sleep(interval);
                }
            }));
        }
        Ok(handles)
    }

    /// Run writer and sender of every device interlaced in a single loop
    /// per device: read, save, send, sleep
    pub fn run_interlaced<S, F>(self, mut source_factory: F) -> Result<Vec<JoinHandle<()>>>
    where
        S: DataSource + 'static,
        F: FnMut(&str) -> S,
    {
        let mut handles = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let dir = self.device_dir(name);
            let mut writer = self.make_writer(&dir)?;
            let sender =
                QueueSender::new(self.config.sender_config(&dir, self.sender_name(name)))?;

            let mut source = source_factory(name);
            let name = name.clone();
            let interval = self.config.writer_sleep;
            handles.push(std::thread::spawn(move || {
                info!("Started writer and sender interlaced for {}", name);
                loop {
                    if let Some(values) = source.read() {
                        if let Err(err) = writer.save(values, 0, None, None) {
                            error!("Saving data for {} failed: {}", name, err);
                        }
                    }
                    sender.send();
                    std::thread::sleep(interval);
                }
            }));
        }
        Ok(handles)
    }
}
