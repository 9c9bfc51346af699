use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::{Result, ScrapbookError};

/// A leaf of the output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Timestamp(DateTime<FixedOffset>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Timestamp(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(Value),
    Branch(ValueTree),
}

/// Nested mapping built up from dotted keys. Keys serialize in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValueTree(BTreeMap<String, Node>);

/// Output document encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl ValueTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `value` at a dotted key, creating intermediate mappings as needed.
    ///
    /// A value already stored at the exact key is replaced. Descending through
    /// a key that holds a plain value fails with [`ScrapbookError::KeyConflict`].
    pub fn insert(&mut self, dotted_key: &str, value: Value) -> Result<()> {
        let mut tree = self;
        let mut rest = dotted_key;
        let mut consumed = 0;

        while let Some((head, tail)) = rest.split_once('.') {
            consumed += head.len();
            let node = tree
                .0
                .entry(head.to_string())
                .or_insert_with(|| Node::Branch(ValueTree::new()));
            tree = match node {
                Node::Branch(child) => child,
                Node::Leaf(_) => {
                    return Err(ScrapbookError::KeyConflict {
                        key: dotted_key.to_string(),
                        prefix: dotted_key[..consumed].to_string(),
                    });
                }
            };
            consumed += 1;
            rest = tail;
        }

        if let Some(Node::Branch(_)) = tree.0.insert(rest.to_string(), Node::Leaf(value)) {
            warn!(key = dotted_key, "replaced a nested mapping with a plain value");
        }
        Ok(())
    }

    /// Render the whole tree in the requested format.
    pub fn render(&self, format: Format) -> Result<String> {
        match format {
            Format::Yaml => Ok(serde_yaml_ng::to_string(self)?),
            Format::Json => {
                let mut json = serde_json::to_string_pretty(self)?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    pub fn write_to<W: Write>(&self, format: Format, mut out: W) -> Result<()> {
        let rendered = self.render(format)?;
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
