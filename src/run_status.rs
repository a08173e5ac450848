//! Correlation of an external run-status feed with the node and dataset
//! ids of the normalized graph. Deliberately loose coupling: the feed is
//! partitioned as-is, ids that match nothing in the graph are kept, and
//! nothing here ever fails.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sentinel run id reported when no real run is available.
pub const DEFAULT_RUN_ID: &str = "default-run-id";

/// Per-node/dataset entry of the status feed. Replaced wholesale on every
/// run fetch, never merged field-by-field with a previous run.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunStatusEntry {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunStatusEntry {
    /// Failure is signalled by a present error; a missing error field
    /// degrades to success.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PipelineRunInfo {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw status feed as fetched by the external collaborator.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RunStatusFeed {
    #[serde(default)]
    pub nodes: IndexMap<String, RunStatusEntry>,
    #[serde(default)]
    pub datasets: IndexMap<String, RunStatusEntry>,
    #[serde(default)]
    pub pipeline: PipelineRunInfo,
}

impl RunStatusFeed {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Total partition of one id space: every entry lands in exactly one of
/// the two buckets.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct StatusPartition {
    pub success: IndexMap<String, RunStatusEntry>,
    pub failed: IndexMap<String, RunStatusEntry>,
}

impl StatusPartition {
    fn from_entries(entries: IndexMap<String, RunStatusEntry>) -> Self {
        let mut partition = Self::default();
        for (id, entry) in entries {
            if entry.is_failed() {
                partition.failed.insert(id, entry);
            } else {
                partition.success.insert(id, entry);
            }
        }
        partition
    }

    pub fn len(&self) -> usize {
        self.success.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.failed.is_empty()
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct RunStatusSummary {
    pub nodes: StatusPartition,
    pub datasets: StatusPartition,
    pub pipeline: PipelineRunInfo,
}

impl RunStatusSummary {
    /// Whether the feed describes an actual run. A missing, empty or
    /// sentinel run id means there is none; what to render in that case is
    /// the consumer's decision.
    pub fn has_real_run(&self) -> bool {
        match self.pipeline.run_id.as_deref() {
            Some(id) => !id.is_empty() && id != DEFAULT_RUN_ID,
            None => false,
        }
    }
}

/// Partition a status feed into success/failure groupings per id space.
pub fn correlate(feed: RunStatusFeed) -> RunStatusSummary {
    RunStatusSummary {
        nodes: StatusPartition::from_entries(feed.nodes),
        datasets: StatusPartition::from_entries(feed.datasets),
        pipeline: feed.pipeline,
    }
}
