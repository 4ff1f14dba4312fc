use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal classification of a target for one run.
///
/// Persisted as a numeric mark: `0` unreachable, `1` reachable with low
/// resource growth, `2` reachable with high resource growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Unreachable,
    ReachableLowGrowth,
    ReachableHighGrowth,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown verdict '{0}' (expected 0, 1, 2, unreachable, low or high)")]
pub struct ParseVerdictError(String);

impl Verdict {
    pub const ALL: [Verdict; 3] = [
        Verdict::Unreachable,
        Verdict::ReachableLowGrowth,
        Verdict::ReachableHighGrowth,
    ];

    pub fn mark(self) -> u8 {
        match self {
            Verdict::Unreachable => 0,
            Verdict::ReachableLowGrowth => 1,
            Verdict::ReachableHighGrowth => 2,
        }
    }

    pub fn from_mark(mark: u8) -> Option<Self> {
        match mark {
            0 => Some(Verdict::Unreachable),
            1 => Some(Verdict::ReachableLowGrowth),
            2 => Some(Verdict::ReachableHighGrowth),
            _ => None,
        }
    }

    pub fn is_reachable(self) -> bool {
        !matches!(self, Verdict::Unreachable)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Unreachable => "unreachable",
            Verdict::ReachableLowGrowth => "reachable-low-growth",
            Verdict::ReachableHighGrowth => "reachable-high-growth",
        };
        f.write_str(label)
    }
}

impl FromStr for Verdict {
    type Err = ParseVerdictError;

    /// Accepts the numeric mark, the display label (with `-` or `_`), or the
    /// short forms `low` and `high`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "0" | "unreachable" => Ok(Verdict::Unreachable),
            "1" | "low" | "reachable-low-growth" => Ok(Verdict::ReachableLowGrowth),
            "2" | "high" | "reachable-high-growth" => Ok(Verdict::ReachableHighGrowth),
            _ => Err(ParseVerdictError(s.to_string())),
        }
    }
}
