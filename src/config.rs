use std::path::PathBuf;
use std::time::Duration;

use crate::tree::Format;

pub const DEFAULT_DOCKER: &str = "docker";

/// Settings for one run, resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Executable used to list local images
    pub docker: String,
    /// Overall deadline; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Output file; `None` writes to stdout
    pub out: Option<PathBuf>,
    pub format: Format,
    /// Suppress progress output on stderr
    pub quiet: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            docker: DEFAULT_DOCKER.to_string(),
            timeout: None,
            out: None,
            format: Format::Yaml,
            quiet: false,
        }
    }
}

impl AppConfig {
    pub fn from_cli(
        docker: String,
        timeout_secs: Option<u64>,
        out: Option<PathBuf>,
        json: bool,
        quiet: bool,
    ) -> Self {
        Self {
            docker,
            timeout: timeout_secs.filter(|&s| s > 0).map(Duration::from_secs),
            out,
            format: if json { Format::Json } else { Format::Yaml },
            quiet,
        }
    }
}
