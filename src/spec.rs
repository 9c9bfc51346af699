use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ScrapbookError};

/// Field of an image record that becomes the output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handler {
    Id,
    Repository,
    Tag,
    #[default]
    Digest,
    CreatedSince,
    CreatedAt,
    Size,
    /// `repository@digest`
    Full,
}

impl FromStr for Handler {
    type Err = ScrapbookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "repository" => Ok(Self::Repository),
            "tag" => Ok(Self::Tag),
            "digest" => Ok(Self::Digest),
            "createdsince" => Ok(Self::CreatedSince),
            "createdat" => Ok(Self::CreatedAt),
            "size" => Ok(Self::Size),
            "full" => Ok(Self::Full),
            _ => Err(ScrapbookError::UnknownHandler(s.to_string())),
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::Repository => "repository",
            Self::Tag => "tag",
            Self::Digest => "digest",
            Self::CreatedSince => "createdsince",
            Self::CreatedAt => "createdat",
            Self::Size => "size",
            Self::Full => "full",
        };
        f.write_str(name)
    }
}

/// One `--value` request: where to put the value and which image it comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSpec {
    /// Dotted path in the output document
    pub key: String,
    pub repository: String,
    /// Empty means any tag
    pub tag: String,
    pub handler: Handler,
}

impl FromStr for ValueSpec {
    type Err = ScrapbookError;

    /// Parse `key=repository[:tag][=handler]`.
    fn from_str(spec: &str) -> Result<Self> {
        if spec.is_empty() {
            return Err(ScrapbookError::malformed(spec, "missing key"));
        }

        let parts: Vec<&str> = spec.split('=').collect();
        let (key, image, handler) = match parts.as_slice() {
            [_] => return Err(ScrapbookError::malformed(spec, "missing repository")),
            [key, image] => (*key, *image, Handler::default()),
            [key, image, handler] => (*key, *image, handler.parse()?),
            _ => return Err(ScrapbookError::malformed(spec, "too many '=' separators")),
        };

        if key.is_empty() {
            return Err(ScrapbookError::malformed(spec, "missing key"));
        }
        if key.split('.').any(str::is_empty) {
            return Err(ScrapbookError::malformed(spec, "key has an empty segment"));
        }

        let (repository, tag) = split_repo_and_tag(image);
        if repository.is_empty() {
            return Err(ScrapbookError::malformed(spec, "missing repository"));
        }

        Ok(Self {
            key: key.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
            handler,
        })
    }
}

/// Split `repo:tag` on the last colon, leaving registry ports (`host:5000/app`) alone.
fn split_repo_and_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, ""),
    }
}
