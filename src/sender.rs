// BayEOS Client - Durable frame queue and forwarder for edge telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Queue sender
//!
//! [`QueueSender`] drains ready queue files from a directory, re-wraps every
//! stored frame with timing information, batches one file into one HTTP POST
//! and resolves the outcome against the filesystem. Delivery is at least
//! once: a crash between a successful post and the local delete/rename means
//! the same records are resent on the next run.

use crate::config::SenderConfig;
use crate::error::{Error, Result, StorageError, TransportError};
use crate::frame::{now_epoch, wrap_delayed, wrap_timestamp_ms};
use crate::queue::{self, QueueState, Record, RecordReader};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-Agent string sent with every post
pub const USER_AGENT: &str = concat!("BayEOS-Rust-Gateway-Client/", env!("CARGO_PKG_VERSION"));

/// Outcome of processing one ready file
enum FileOutcome {
    /// Posted successfully, file resolved (deleted or renamed)
    Sent(usize),
    /// Empty or corrupt file, handled locally, nothing posted
    Skipped,
}

/// Forwards ready queue files to a gateway over HTTP POST
pub struct QueueSender {
    config: SenderConfig,
    agent: ureq::Agent,
    auth_header: String,
}

impl QueueSender {
    /// Create a sender for one queue directory
    ///
    /// Fails on an empty password and on backup-directory creation failure.
    pub fn new(config: SenderConfig) -> Result<Self> {
        if config.password.is_empty() {
            return Err(Error::Config(
                "no gateway password configured".to_string(),
            ));
        }
        if let Some(backup) = &config.backup_path {
            std::fs::create_dir_all(backup).map_err(|source| StorageError::CreateDir {
                path: backup.display().to_string(),
                source,
            })?;
        }
        let auth_header = format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", config.user, config.password))
        );
        Ok(Self {
            config,
            agent: ureq::AgentBuilder::new().build(),
            auth_header,
        })
    }

    /// Send all ready files, primary directory first, then the backup
    /// directory if one is configured
    ///
    /// Returns the number of frames successfully forwarded. Failures are
    /// logged and resolved against the filesystem; they never escape this
    /// call, so the forwarding loop survives sustained gateway downtime.
    pub fn send(&self) -> usize {
        let mut count = self.send_dir(&self.config.path);
        if let Some(backup) = &self.config.backup_path {
            count += self.send_dir(backup);
        }
        count
    }

    /// Drain one directory, oldest file first
    fn send_dir(&self, dir: &Path) -> usize {
        let files = match queue::list_state_files(dir, QueueState::Ready) {
            Ok(files) => files,
            Err(err) => {
                warn!("{}", err);
                return 0;
            }
        };

        let mut count = 0;
        for (index, file) in files.iter().enumerate() {
            match self.send_file(file) {
                Ok(FileOutcome::Sent(n)) => count += n,
                Ok(FileOutcome::Skipped) => {}
                Err(err) => {
                    warn!("Sending {} failed: {}", file.display(), err);
                    // Ordering is preserved by never skipping ahead past a
                    // failed file. With a backup directory configured, the
                    // failed file and everything behind it are quarantined
                    // there so a stalled gateway does not block the primary
                    // directory.
                    if let Some(backup) = &self.config.backup_path {
                        if dir != backup {
                            self.quarantine(&files[index..], backup);
                        }
                    }
                    break;
                }
            }
        }
        count
    }

    /// Move still-ready files into the backup directory, keeping their names
    fn quarantine(&self, files: &[PathBuf], backup: &Path) {
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = backup.join(name);
            if let Err(source) = std::fs::rename(file, &target) {
                warn!(
                    "{}",
                    StorageError::Rename {
                        from: file.display().to_string(),
                        to: target.display().to_string(),
                        source,
                    }
                );
            }
        }
    }

    /// Read one ready file and try to post its content
    fn send_file(&self, file: &Path) -> Result<FileOutcome> {
        let handle = File::open(file).map_err(|source| StorageError::Io {
            path: file.display().to_string(),
            source,
        })?;
        let records: Vec<Record> = RecordReader::new(handle).collect();

        if records.is_empty() {
            return self.dispose_unsendable(file);
        }

        let now = now_epoch();
        let mut form: Vec<(String, String)> =
            vec![("sender".to_string(), self.config.name.clone())];
        for record in &records {
            let wrapped = if self.config.absolute_time {
                // millisecond resolution from 1970-01-01
                wrap_timestamp_ms((record.timestamp * 1000.0).round() as i64, &record.frame)
            } else {
                wrap_delayed(((now - record.timestamp) * 1000.0).round() as i32, &record.frame)
            };
            form.push(("bayeosframes[]".to_string(), URL_SAFE.encode(wrapped)));
        }

        self.post(&form)?;

        if self.config.remove {
            std::fs::remove_file(file).map_err(|source| StorageError::Io {
                path: file.display().to_string(),
                source,
            })?;
        } else {
            self.move_to_backup(file)?;
        }
        Ok(FileOutcome::Sent(records.len()))
    }

    /// A file with zero decodable records: delete if empty, quarantine as
    /// corrupt otherwise
    fn dispose_unsendable(&self, file: &Path) -> Result<FileOutcome> {
        let size = std::fs::metadata(file)
            .map_err(|source| StorageError::Io {
                path: file.display().to_string(),
                source,
            })?
            .len();
        if size == 0 {
            std::fs::remove_file(file).map_err(|source| StorageError::Io {
                path: file.display().to_string(),
                source,
            })?;
        } else {
            warn!("Quarantining corrupt queue file {}", file.display());
            self.move_to_backup(file)?;
        }
        Ok(FileOutcome::Skipped)
    }

    /// Rename a file to backup state, into the backup directory when one is
    /// configured
    fn move_to_backup(&self, file: &Path) -> Result<()> {
        match &self.config.backup_path {
            None => {
                queue::change_state(file, QueueState::Backup)?;
            }
            Some(backup) => {
                let target = backup
                    .join(file.file_name().unwrap_or_default())
                    .with_extension(QueueState::Backup.extension());
                std::fs::rename(file, &target).map_err(|source| StorageError::Rename {
                    from: file.display().to_string(),
                    to: target.display().to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Post one form-encoded batch to the gateway
    fn post(&self, form: &[(String, String)]) -> std::result::Result<(), TransportError> {
        let pairs: Vec<(&str, &str)> = form
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let result = self
            .agent
            .post(&self.config.url)
            .set("Authorization", &self.auth_header)
            .set("Accept", "text/html")
            .set("User-Agent", USER_AGENT)
            .send_form(&pairs);

        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(401, _)) => Err(TransportError::AuthenticationFailed),
            Err(ureq::Error::Status(404, _)) => {
                Err(TransportError::InvalidUrl(self.config.url.clone()))
            }
            Err(ureq::Error::Status(code, _)) => Err(TransportError::Http(code)),
            Err(ureq::Error::Transport(transport)) => {
                Err(TransportError::Network(transport.to_string()))
            }
        }
    }

    /// Forwarding loop: send, sleep, repeat indefinitely
    pub fn run(&self, interval: Duration) -> ! {
        loop {
            let count = self.send();
            if count > 0 {
                info!("Successfully sent {} frames", count);
            }
            std::thread::sleep(interval);
        }
    }

    /// Run the forwarding loop on a background thread
    pub fn start(self, interval: Duration) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || self.run(interval))
    }
}
