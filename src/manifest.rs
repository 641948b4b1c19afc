//! YAML description of the files written by one `decode` run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use dsd::structs::tags::TrackTags;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub source: String,
    pub container: String,
    pub mode: OutputMode,
    pub sample_rate: u32,
    pub channels: usize,
    /// Bits per sample; 32 for float output.
    pub bits: u32,
    #[serde(default)]
    pub float: bool,
    #[serde(default)]
    pub tracks: Vec<TrackEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Pcm,
    Dop,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEntry {
    pub number: usize,
    pub file: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub frames: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl TrackEntry {
    pub fn tags_from(tags: Option<&TrackTags>) -> BTreeMap<String, String> {
        tags.map(|t| {
            t.entries()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect()
        })
        .unwrap_or_default()
    }
}

impl Manifest {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}
