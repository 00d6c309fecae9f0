use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::errors::ChatError;

static INIT: OnceCell<()> = OnceCell::new();

/// Verbosity and destination of chat diagnostics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogConfig {
    filter: String,
    json_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("warn")
    }
}

impl LogConfig {
    /// `filter` uses `EnvFilter` directive syntax, e.g. `warn` or
    /// `agent_chat=debug`.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            json_path: None,
        }
    }

    /// Writes JSON lines to `path` instead of the console.
    pub fn json_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn json_path(&self) -> Option<&Path> {
        self.json_path.as_deref()
    }

    fn env_filter(&self) -> Result<EnvFilter, ChatError> {
        EnvFilter::try_new(&self.filter)
            .map_err(|err| ChatError::Config(format!("invalid log filter `{}`: {err}", self.filter)))
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, OsString), ChatError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ChatError::Config(format!("log path `{}` has no file name", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir.to_path_buf(), file_name.to_os_string()))
}

/// Installs the global subscriber. Only the first call has an effect.
///
/// Console output goes to stderr so it never interleaves with a reply
/// streamed to stdout.
pub fn init_observability(config: &LogConfig) -> Result<(), ChatError> {
    INIT.get_or_try_init(|| {
        let filter = config.env_filter()?;
        match config.json_path() {
            Some(path) => {
                let (dir, file_name) = split_log_path(path)?;
                std::fs::create_dir_all(&dir).map_err(|err| {
                    ChatError::Config(format!("cannot create log directory `{}`: {err}", dir.display()))
                })?;
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init();
            }
        }
        Ok(())
    })
    .map(|_| ())
}
