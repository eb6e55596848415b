// Liveness of pipeline scopes between two topology snapshots, and node styling
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessClass {
    New,
    Dead,
    Existing,
}

/// Three disjoint sets of element paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    #[serde(default)]
    pub new: HashSet<String>,
    #[serde(default)]
    pub dead: HashSet<String>,
    #[serde(default)]
    pub existing: HashSet<String>,
}

impl Liveness {
    /// Classify every path seen in either snapshot.
    pub fn between(previous: &HashSet<String>, current: &HashSet<String>) -> Self {
        Self {
            new: current.difference(previous).cloned().collect(),
            dead: previous.difference(current).cloned().collect(),
            existing: current.intersection(previous).cloned().collect(),
        }
    }

    /// Dead wins over new, new wins over existing.
    pub fn classify(&self, path: &str) -> Option<LivenessClass> {
        if self.dead.contains(path) {
            Some(LivenessClass::Dead)
        } else if self.new.contains(path) {
            Some(LivenessClass::New)
        } else if self.existing.contains(path) {
            Some(LivenessClass::Existing)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<&'static str>,
    #[serde(rename = "lineWidth", skip_serializing_if = "Option::is_none")]
    pub line_width: Option<u8>,
}

const fn style(fill: &'static str, stroke: &'static str, line_width: u8) -> NodeStyle {
    NodeStyle {
        fill: Some(fill),
        stroke: Some(stroke),
        line_width: Some(line_width),
    }
}

// Indexed by [class][is_bin]
const STYLES: [[NodeStyle; 2]; 3] = [
    [style("#d9f7be", "#52c41a", 1), style("#f6ffed", "#389e0d", 3)],
    [style("#ffccc7", "#f5222d", 1), style("#fff1f0", "#cf1322", 3)],
    [style("#d6e4ff", "#2f54eb", 1), style("#f0f5ff", "#1d39c4", 3)],
];

impl LivenessClass {
    pub fn style(self, is_bin: bool) -> NodeStyle {
        let row = match self {
            LivenessClass::New => 0,
            LivenessClass::Dead => 1,
            LivenessClass::Existing => 2,
        };
        STYLES[row][usize::from(is_bin)]
    }
}
