//! Configuration types for the gateway client

use crate::value::DEFAULT_VALUE_TYPE;
use std::path::PathBuf;
use std::time::Duration;

/// Client-level configuration, shared by every device the client runs
///
/// Defaults match the reference deployment: 2500-byte chunks, 60-second file
/// age, 5-second loop intervals, gateway account "import".
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base directory for per-device queue directories
    pub path: PathBuf,

    /// Maximum queue file size in bytes before rotation
    pub max_chunk: u64,

    /// Maximum queue file age before rotation
    pub max_time: Duration,

    /// Default value type byte for saved data frames
    pub value_type: u8,

    /// Sleep interval of the writer loop
    pub writer_sleep: Duration,

    /// Sleep interval of the sender loop
    pub sender_sleep: Duration,

    /// Gateway URL, e.g. `http://<gateway>/gateway/frame/saveFlat`
    pub url: String,

    /// Gateway user
    pub user: String,

    /// Gateway password
    pub password: String,

    /// Sender name prefix; host name is used when unset and more than one
    /// device is run
    pub sender: Option<String>,

    /// Wrap stored frames with absolute timestamps (false = relative delay)
    pub absolute_time: bool,

    /// Delete files after a successful post (false = keep as backup files)
    pub remove: bool,

    /// Secondary directory for quarantined ready files
    pub backup_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir(),
            max_chunk: 2500,
            max_time: Duration::from_secs(60),
            value_type: DEFAULT_VALUE_TYPE,
            writer_sleep: Duration::from_secs(5),
            sender_sleep: Duration::from_secs(5),
            url: String::new(),
            user: "import".to_string(),
            password: "import".to_string(),
            sender: None,
            absolute_time: true,
            remove: true,
            backup_path: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at a gateway URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the gateway credentials
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the base queue directory
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Derive the sender configuration for one device directory
    pub fn sender_config(&self, path: impl Into<PathBuf>, name: impl Into<String>) -> SenderConfig {
        SenderConfig {
            path: path.into(),
            name: name.into(),
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            absolute_time: self.absolute_time,
            remove: self.remove,
            backup_path: self.backup_path.clone(),
        }
    }
}

/// Configuration of one [`QueueSender`](crate::QueueSender)
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Queue directory the paired writer fills
    pub path: PathBuf,
    /// Sender name reported to the gateway
    pub name: String,
    /// Gateway URL
    pub url: String,
    /// Gateway user
    pub user: String,
    /// Gateway password
    pub password: String,
    /// Wrap stored frames with absolute timestamps (false = relative delay)
    pub absolute_time: bool,
    /// Delete files after a successful post (false = keep as backup files)
    pub remove: bool,
    /// Secondary directory for quarantined ready files
    pub backup_path: Option<PathBuf>,
}

impl SenderConfig {
    /// Create a sender configuration with library defaults
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let defaults = ClientConfig::default();
        Self {
            path: path.into(),
            name: name.into(),
            url: url.into(),
            user: defaults.user,
            password: defaults.password,
            absolute_time: defaults.absolute_time,
            remove: defaults.remove,
            backup_path: None,
        }
    }

    /// Set the gateway credentials
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Keep sent files as backups instead of deleting them
    pub fn keep_backups(mut self) -> Self {
        self.remove = false;
        self
    }

    /// Quarantine unsent ready files into a secondary directory
    pub fn backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(path.into());
        self
    }

    /// Use relative-time (delay) wrapping instead of absolute timestamps
    pub fn relative_time(mut self) -> Self {
        self.absolute_time = false;
        self
    }
}
