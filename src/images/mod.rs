pub mod docker;

use std::fmt;

use chrono::{DateTime, FixedOffset};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, ScrapbookError};
use crate::spec::Handler;
use crate::tree::Value;

/// One row of local image listing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub repository: String,
    pub tag: String,
    /// Content digest (e.g. sha256:abc123...), `<none>` for images never pushed or pulled
    pub digest: String,
    /// Human readable age, e.g. "2 hours ago"
    pub created_since: String,
    pub created_at: DateTime<FixedOffset>,
    /// Human readable size, e.g. "77.8MB"
    pub size: String,
}

impl ImageRecord {
    /// Extract the value a handler selects.
    pub fn field(&self, handler: Handler) -> Value {
        match handler {
            Handler::Id => Value::Text(self.id.clone()),
            Handler::Repository => Value::Text(self.repository.clone()),
            Handler::Tag => Value::Text(self.tag.clone()),
            Handler::Digest => Value::Text(self.digest.clone()),
            Handler::CreatedSince => Value::Text(self.created_since.clone()),
            Handler::CreatedAt => Value::Timestamp(self.created_at),
            Handler::Size => Value::Text(self.size.clone()),
            Handler::Full => Value::Text(format!("{}@{}", self.repository, self.digest)),
        }
    }
}

/// A `label=<key>=<value>` filter handed to the image listing command as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter(String);

impl LabelFilter {
    /// Build a filter from a `key=value` label selector.
    pub fn label(selector: &str) -> Self {
        Self(format!("label={selector}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of locally available images.
pub trait ImageLister {
    /// List every local image of `repository` matching all `filters`.
    ///
    /// Tags are deliberately not passed down: filtering by tag at this layer
    /// breaks digest reporting (moby/moby#29901), see [`filter_by_tag`].
    async fn list(
        &self,
        repository: &str,
        filters: &[LabelFilter],
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageRecord>>;
}

/// Keep only records whose tag equals `tag` exactly. An empty tag keeps everything.
pub fn filter_by_tag(tag: &str, images: Vec<ImageRecord>) -> Vec<ImageRecord> {
    if tag.is_empty() {
        return images;
    }

    let before = images.len();
    let kept: Vec<ImageRecord> = images.into_iter().filter(|i| i.tag == tag).collect();
    debug!(tag, before, after = kept.len(), "filtered images by tag");
    kept
}

/// Pick the most recently created image. The first of several equally recent
/// images wins.
pub fn select_latest<'a>(
    repository: &str,
    tag: &str,
    images: &'a [ImageRecord],
) -> Result<&'a ImageRecord> {
    match images {
        [] => Err(ScrapbookError::NotFound {
            repository: repository.to_string(),
            tag: tag.to_string(),
        }),
        [only] => Ok(only),
        [first, rest @ ..] => {
            let mut latest = first;
            for image in rest {
                if latest.created_at < image.created_at {
                    latest = image;
                }
            }
            debug!(
                candidates = images.len(),
                id = %latest.id,
                created_at = %latest.created_at,
                "picked most recent image"
            );
            Ok(latest)
        }
    }
}
