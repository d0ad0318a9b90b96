//! Decoding of Google pprof CPU profiles and construction of the line-level
//! call graph that `parloop` attributes loop cost from.
//!
//! The profile format is a gzipped protobuf message; we read the handful of
//! fields the attribution needs (samples, locations, lines, functions, the
//! string table and the total duration) and ignore the rest. Graph
//! construction follows pprof's own algorithm: every sample contributes its
//! weight to the cumulative total of each distinct node on its stack, and its
//! flat total to the leaf node only.

use std::fs;
use std::path::Path;

mod graph;
mod proto;

pub use graph::{Graph, Node, NodeInfo};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile data is truncated")]
    Truncated,
    #[error("unsupported wire type {0} for field {1}")]
    WireType(u32, u32),
    #[error("string table entry is not valid UTF-8")]
    BadString,
    #[error("string table index {0} out of range")]
    BadStringIndex(usize),
}

/// One value dimension of a profile, e.g. `cpu/nanoseconds`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueType {
    pub kind: String,
    pub unit: String,
}

/// A single stack sample. `location_ids[0]` is the leaf frame.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub location_ids: Vec<u64>,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub function_id: u64,
    pub line: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Location {
    pub id: u64,
    pub address: u64,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Default)]
pub struct Function {
    pub id: u64,
    pub name: String,
    pub filename: String,
    pub start_line: i64,
}

/// An in-memory pprof profile, decoded down to the fields attribution needs.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub sample_types: Vec<ValueType>,
    pub samples: Vec<Sample>,
    pub locations: Vec<Location>,
    pub functions: Vec<Function>,
    pub time_nanos: i64,
    pub duration_nanos: i64,
}

impl Profile {
    /// Parse a profile from raw bytes, transparently gunzipping.
    pub fn parse(data: &[u8]) -> Result<Profile, ProfileError> {
        proto::decode_profile(data)
    }

    /// Parse a profile from a file on disk.
    pub fn parse_file(path: &Path) -> Result<Profile, ProfileError> {
        let data = fs::read(path)?;
        Profile::parse(&data)
    }

    /// Index into `Sample::values` of the weight dimension used for
    /// attribution: the first nanosecond-valued sample type, or the last
    /// dimension when none is labeled (pprof's own fallback).
    pub fn weight_index(&self) -> usize {
        self.sample_types
            .iter()
            .position(|st| st.unit == "nanoseconds")
            .unwrap_or_else(|| self.sample_types.len().saturating_sub(1))
    }

    pub fn graph(&self) -> Graph {
        Graph::from_profile(self)
    }
}
