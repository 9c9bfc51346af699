use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapbookError>;

/// Everything that can abort a scrapbook run. None of these are retried.
#[derive(Error, Debug)]
pub enum ScrapbookError {
    /// A `--value` argument that does not follow `key=repository[:tag][=handler]`
    #[error("malformed value spec {spec:?}: {reason}")]
    MalformedSpec { spec: String, reason: String },

    /// The image-listing command could not be started, failed, or was cancelled
    #[error("'{command}' failed: {message}")]
    Execution { command: String, message: String },

    /// A row of image-listing output did not have the expected shape
    #[error("cannot parse image listing row {row:?}: {reason}")]
    Parse { row: String, reason: String },

    /// No local image survived filtering
    #[error("image not found: {repository}{}", tag_suffix(.tag))]
    NotFound { repository: String, tag: String },

    #[error("unknown handler {0:?} (expected one of: id, repository, tag, digest, createdsince, createdat, size, full)")]
    UnknownHandler(String),

    /// A dotted key tried to descend through a plain value
    #[error("cannot set {key:?}: {prefix:?} already holds a value")]
    KeyConflict { key: String, prefix: String },

    #[error("failed to write output: {0}")]
    Output(String),
}

fn tag_suffix(tag: &str) -> String {
    if tag.is_empty() {
        String::new()
    } else {
        format!(":{tag}")
    }
}

impl ScrapbookError {
    pub fn malformed(spec: &str, reason: impl Into<String>) -> Self {
        Self::MalformedSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn parse(row: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            row: row.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml_ng::Error> for ScrapbookError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapbookError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<std::io::Error> for ScrapbookError {
    fn from(err: std::io::Error) -> Self {
        Self::Output(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_mentions_tag_only_when_requested() {
        let err = ScrapbookError::NotFound {
            repository: "docker.io/example".into(),
            tag: String::new(),
        };
        assert_eq!(err.to_string(), "image not found: docker.io/example");

        let err = ScrapbookError::NotFound {
            repository: "docker.io/example".into(),
            tag: "12345".into(),
        };
        assert_eq!(err.to_string(), "image not found: docker.io/example:12345");
    }
}
