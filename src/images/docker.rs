use std::process::Stdio;

use chrono::{DateTime, FixedOffset};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ImageLister, ImageRecord, LabelFilter};
use crate::error::{Result, ScrapbookError};

// --- `docker images` tabular output ---

const FORMAT_TEMPLATE: &str = "{{ .ID }},{{ .Repository }},{{ .Tag }},{{ .Digest }},{{ .CreatedSince }},{{ .CreatedAt }},{{ .Size }}";
const FIELD_COUNT: usize = 7;

/// `2020-05-01 12:34:56 +0000` once the trailing zone name is split off.
/// Fractional seconds (podman) are optional.
const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Lists local images through the container runtime CLI (`docker images`, or
/// anything accepting the same arguments such as `podman images`).
pub struct DockerLister {
    cmd: String,
}

impl DockerLister {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    fn args(repository: &str, filters: &[LabelFilter]) -> Vec<String> {
        let mut args: Vec<String> = [
            "images",
            repository,
            "--format",
            FORMAT_TEMPLATE,
            "--digests",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        for filter in filters {
            args.push("--filter".to_string());
            args.push(filter.as_str().to_string());
        }
        args
    }

    fn command_line(&self, repository: &str) -> String {
        format!("{} images {repository}", self.cmd)
    }
}

impl ImageLister for DockerLister {
    async fn list(
        &self,
        repository: &str,
        filters: &[LabelFilter],
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageRecord>> {
        let args = Self::args(repository, filters);
        debug!(cmd = %self.cmd, ?args, "listing local images");

        let child = Command::new(&self.cmd)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScrapbookError::execution(self.command_line(repository), e.to_string()))?;

        // Dropping the pending future kills the child.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ScrapbookError::execution(self.command_line(repository), "cancelled"));
            }
            output = child.wait_with_output() => output
                .map_err(|e| ScrapbookError::execution(self.command_line(repository), e.to_string()))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match output.status.code() {
                Some(code) => format!("exit code {code}: {}", stderr.trim()),
                None => format!("terminated by signal: {}", stderr.trim()),
            };
            return Err(ScrapbookError::execution(self.command_line(repository), message));
        }

        let images = parse_listing(listing_text(&output.stdout)?)?;
        debug!(repository, count = images.len(), "listed local images");
        Ok(images)
    }
}

fn listing_text(stdout: &[u8]) -> Result<&str> {
    std::str::from_utf8(stdout).map_err(|e| {
        ScrapbookError::parse(&String::from_utf8_lossy(stdout), format!("output is not UTF-8: {e}"))
    })
}

/// Parse every non-blank line of listing output.
pub fn parse_listing(output: &str) -> Result<Vec<ImageRecord>> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(parse_row)
        .collect()
}

fn parse_row(row: &str) -> Result<ImageRecord> {
    let fields: Vec<&str> = row.split(',').collect();
    let [id, repository, tag, digest, created_since, created_at, size] = fields[..] else {
        return Err(ScrapbookError::parse(
            row,
            format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
        ));
    };

    let created_at = parse_created_at(created_at)
        .ok_or_else(|| ScrapbookError::parse(row, format!("invalid CreatedAt {created_at:?}")))?;

    Ok(ImageRecord {
        id: id.to_string(),
        repository: repository.to_string(),
        tag: tag.to_string(),
        digest: digest.to_string(),
        created_since: created_since.to_string(),
        created_at,
        size: size.to_string(),
    })
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fff] ±ZZZZ ZONE`. The zone name must look like an
/// abbreviation (`UTC`, `CEST`) or an offset (`+03`), but the numeric offset is
/// what counts.
fn parse_created_at(s: &str) -> Option<DateTime<FixedOffset>> {
    let (stamp, zone) = s.trim().rsplit_once(' ')?;
    if !is_zone_name(zone) {
        return None;
    }
    DateTime::parse_from_str(stamp, CREATED_AT_FORMAT).ok()
}

fn is_zone_name(zone: &str) -> bool {
    match zone.strip_prefix(['+', '-']) {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => zone.len() >= 3 && zone.bytes().all(|b| b.is_ascii_uppercase()),
    }
}
