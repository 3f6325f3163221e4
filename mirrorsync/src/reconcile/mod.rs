//! Drift detection between an authoritative table and a freshly rebuilt mirror, and its repair.

mod diff;
mod reconciler;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;

pub use diff::{DiffResult, diff_sorted, sorted_unique};
pub use reconciler::Reconciler;

/// Corrective actions a reconciliation run may apply, as a bitmask.
///
/// The empty mode only reports drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RepairMode(u8);

impl RepairMode {
    pub const REPORT_ONLY: RepairMode = RepairMode(0);
    /// Delete rows of keys and versions missing from the mirror.
    pub const DELETE: RepairMode = RepairMode(1);
    /// Copy rows of keys and versions missing from the authoritative table.
    pub const ADD: RepairMode = RepairMode(2);

    /// Keeps the known bits of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        RepairMode(bits & (Self::DELETE.0 | Self::ADD.0))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: RepairMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn deletes(&self) -> bool {
        self.contains(Self::DELETE)
    }

    pub fn adds(&self) -> bool {
        self.contains(Self::ADD)
    }
}

impl BitOr for RepairMode {
    type Output = RepairMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        RepairMode(self.0 | rhs.0)
    }
}

impl fmt::Display for RepairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.deletes(), self.adds()) {
            (false, false) => f.write_str("report_only"),
            (true, false) => f.write_str("delete"),
            (false, true) => f.write_str("add"),
            (true, true) => f.write_str("delete|add"),
        }
    }
}

/// Versions of one key present on only one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDiff {
    pub extra_in_authoritative: Vec<i64>,
    pub extra_in_mirror: Vec<i64>,
}

/// The drift found by one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub keys_only_in_authoritative: Vec<String>,
    pub keys_only_in_mirror: Vec<String>,
    pub common_keys: Vec<String>,
    /// Keys present on both sides whose versions differ.
    pub per_key_version_diff: BTreeMap<String, VersionDiff>,
}

impl ReconciliationResult {
    pub fn has_drift(&self) -> bool {
        !self.keys_only_in_authoritative.is_empty()
            || !self.keys_only_in_mirror.is_empty()
            || !self.per_key_version_diff.is_empty()
    }
}

/// Counts of one reconciliation run together with the drift it acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub rows_deleted: u64,
    pub rows_inserted: u64,
    pub result: ReconciliationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_modes_combine() {
        let both = RepairMode::DELETE | RepairMode::ADD;
        assert!(both.deletes() && both.adds());
        assert_eq!(RepairMode::from_bits(3), both);
        assert_eq!(RepairMode::from_bits(0xfd), RepairMode::DELETE);
        assert!(!RepairMode::REPORT_ONLY.deletes());
        assert_eq!(RepairMode::ADD.to_string(), "add");
    }
}
