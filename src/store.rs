//! Flat-file artifact store.
//!
//! One artifact group per completed inference, keyed by a caller-supplied
//! unique identifier embedded in the output base filename. There is no
//! database and no index: discovery is directory listing plus filename
//! pattern matching. Concurrent requests never collide because every group
//! hangs off its own unique base.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analytics::ClusterStat;
use crate::error::Result;

/// Filename suffix shared by every overlay, and the anchor for discovery.
const OVERLAY_SUFFIX: &str = "_output.png";

/// Derived file locations for one artifact group.
///
/// `base` is the overlay path without its extension
/// (e.g. `static/3f2a_output`); every sibling artifact appends a fixed
/// suffix to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    base: PathBuf,
}

impl ArtifactPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base for an overlay path; a trailing `.png` is stripped if present.
    pub fn from_overlay(out_path: &Path) -> Self {
        let mut base = out_path.to_path_buf();
        if base.extension().is_some_and(|e| e == "png") {
            base.set_extension("");
        }
        Self { base }
    }

    fn suffixed(&self, suffix: &str) -> PathBuf {
        let mut s = self.base.as_os_str().to_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }

    pub fn overlay(&self) -> PathBuf {
        self.suffixed(".png")
    }
    pub fn legend(&self) -> PathBuf {
        self.suffixed("_legend.png")
    }
    pub fn distribution(&self) -> PathBuf {
        self.suffixed("_distribution.png")
    }
    pub fn pie(&self) -> PathBuf {
        self.suffixed("_pie.png")
    }
    pub fn silhouette(&self) -> PathBuf {
        self.suffixed("_silhouette.png")
    }
    pub fn pca(&self) -> PathBuf {
        self.suffixed("_pca.png")
    }
    pub fn embedding(&self) -> PathBuf {
        self.suffixed("_tsne.png")
    }
    pub fn heatmap(&self) -> PathBuf {
        self.suffixed("_heatmap.png")
    }
    pub fn metrics(&self) -> PathBuf {
        self.suffixed("_metrics.txt")
    }
    pub fn stats(&self) -> PathBuf {
        self.suffixed("_stats.json")
    }
}

/// One completed inference discovered in the store.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub created_at: String,
    pub modified: SystemTime,
    pub paths: ArtifactPaths,
    /// Parsed `_stats.json` records; empty when the file is missing or
    /// unreadable.
    pub stats: Vec<ClusterStat>,
}

/// Aggregate view over every completed inference in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub images_processed: usize,
    /// Sum of each image's dominant-cluster percentage; callers scale this
    /// into whatever headline figure they expose.
    pub dominant_share_total: f64,
}

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact locations for a request id.
    pub fn output_paths(&self, id: &str) -> ArtifactPaths {
        ArtifactPaths::new(self.root.join(format!("{id}_output")))
    }

    /// Completed inferences, newest first by overlay modification time.
    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_suffix(OVERLAY_SUFFIX) else {
                continue;
            };
            let modified = dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let paths = self.output_paths(id);
            let stats = read_stats(&paths.stats()).unwrap_or_else(|e| {
                warn!("Unreadable stats for {}: {}", id, e);
                Vec::new()
            });
            let created_at = DateTime::<Local>::from(modified)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string();
            entries.push(HistoryEntry {
                id: id.to_string(),
                created_at,
                modified,
                paths,
                stats,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        debug!("History listing: {} entries", entries.len());
        Ok(entries)
    }

    /// Remove every file belonging to the id's artifact group.
    /// Returns the number of files removed.
    pub fn delete(&self, id: &str) -> Result<usize> {
        let prefix = format!("{id}_");
        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                fs::remove_file(dir_entry.path())?;
                removed += 1;
            }
        }
        info!("Deleted {} files for id {}", removed, id);
        Ok(removed)
    }

    /// Processed-image count and the dominant-share accumulator.
    pub fn aggregate(&self) -> Result<StoreSummary> {
        let mut summary = StoreSummary {
            images_processed: 0,
            dominant_share_total: 0.0,
        };
        for entry in self.history()? {
            summary.images_processed += 1;
            if let Some(dominant) = entry
                .stats
                .iter()
                .max_by(|a, b| a.percentage.total_cmp(&b.percentage))
            {
                summary.dominant_share_total += dominant.percentage;
            }
        }
        Ok(summary)
    }
}

fn read_stats(path: &Path) -> std::io::Result<Vec<ClusterStat>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data).unwrap_or_default())
}
