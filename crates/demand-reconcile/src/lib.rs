#![deny(warnings)]

//! Reconciliation of bottom-up, allocated and residual demand segments.
//!
//! Bottom-up segments come from driver data and are never adjusted. Allocated
//! segments take a fixed share of the total and residual segments take what
//! is left. If the sum still misses the (optionally independent) total by
//! more than the tolerance, only the low-confidence segments are rescaled
//! proportionally.

use demand_core::{
    Confidence, DemandKind, IssueKind, ReconcileConfig, SeriesError, TimeSeries, ValidationIssue,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced by the reconciliation engine.
#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error(transparent)]
    Series(#[from] SeriesError),
    /// Allocation shares must lie in [0, 1].
    #[error("segment {0}: allocation share {1} outside [0, 1]")]
    InvalidShare(String, f64),
    /// Allocation shares together exceed the whole total.
    #[error("allocation shares sum to {0} > 1")]
    AllocationOverflow(f64),
    /// Bottom-up segments must carry a bottom-up confidence tag.
    #[error("segment {0}: bottom-up segments need HIGH or MEDIUM confidence")]
    NotBottomUp(String),
    #[error("duplicate segment name: {0}")]
    DuplicateSegment(String),
    /// A required series has no value for a reconciled year.
    #[error("insufficient data: {series} has no value for {year}")]
    MissingYear { series: String, year: i32 },
    /// Totals must be finite and non-negative.
    #[error("total at {0} is negative or not finite")]
    InvalidTotal(i32),
    #[error("insufficient data: total is empty")]
    EmptyTotal,
}

/// How a segment's demand is obtained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SegmentSource {
    /// Driver-based forecast, taken as-is.
    BottomUp {
        series: TimeSeries,
        confidence: Confidence,
    },
    /// Fixed fraction of the total.
    Allocated { share: f64 },
    /// Remainder of the total after every other segment.
    Residual,
}

/// One segment to reconcile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    pub kind: DemandKind,
    #[serde(flatten)]
    pub source: SegmentSource,
}

impl SegmentSpec {
    pub fn bottom_up(
        name: impl Into<String>,
        kind: DemandKind,
        series: TimeSeries,
        confidence: Confidence,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source: SegmentSource::BottomUp { series, confidence },
        }
    }

    pub fn allocated(name: impl Into<String>, share: f64) -> Self {
        Self {
            name: name.into(),
            kind: DemandKind::Allocated,
            source: SegmentSource::Allocated { share },
        }
    }

    pub fn residual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DemandKind::Residual,
            source: SegmentSource::Residual,
        }
    }

    fn confidence(&self) -> Confidence {
        match &self.source {
            SegmentSource::BottomUp { confidence, .. } => *confidence,
            SegmentSource::Allocated { .. } => Confidence::LowAllocated,
            SegmentSource::Residual => Confidence::LowResidual,
        }
    }
}

/// A labelled, confidence-tagged demand contribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub segment: String,
    pub kind: DemandKind,
    pub confidence: Confidence,
    pub series: TimeSeries,
}

/// Reconciled segments plus the total they were forced to match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub records: Vec<DemandRecord>,
    /// Total the segments were reconciled against.
    pub total: TimeSeries,
    /// Rescaling factor applied to low-confidence segments, by year.
    pub rescaled: Vec<(i32, f64)>,
    pub issues: Vec<ValidationIssue>,
}

impl ReconciliationResult {
    pub fn record(&self, segment: &str) -> Option<&DemandRecord> {
        self.records.iter().find(|r| r.segment == segment)
    }

    /// Sum of all records per year of the total.
    pub fn segment_sum(&self) -> TimeSeries {
        self.total.map(|year, _| {
            self.records
                .iter()
                .filter_map(|r| r.series.get(year))
                .sum()
        })
    }
}

fn check_specs(segments: &[SegmentSpec]) -> Result<(), ReconcileError> {
    let mut seen = BTreeSet::new();
    let mut allocated = 0.0;
    for s in segments {
        if !seen.insert(s.name.as_str()) {
            return Err(ReconcileError::DuplicateSegment(s.name.clone()));
        }
        match &s.source {
            SegmentSource::BottomUp { confidence, .. } if !confidence.is_bottom_up() => {
                return Err(ReconcileError::NotBottomUp(s.name.clone()));
            }
            SegmentSource::Allocated { share } => {
                if !(share.is_finite() && (0.0..=1.0).contains(share)) {
                    return Err(ReconcileError::InvalidShare(s.name.clone(), *share));
                }
                allocated += share;
            }
            _ => {}
        }
    }
    if allocated > 1.0 + 1e-12 {
        return Err(ReconcileError::AllocationOverflow(allocated));
    }
    Ok(())
}

/// Reconcile `segments` so they sum to `total` (or to `independent_total`
/// when supplied) within `cfg.tolerance` for every year of `total`.
pub fn reconcile(
    total: &TimeSeries,
    segments: &[SegmentSpec],
    independent_total: Option<&TimeSeries>,
    cfg: &ReconcileConfig,
) -> Result<ReconciliationResult, ReconcileError> {
    if total.is_empty() {
        return Err(ReconcileError::EmptyTotal);
    }
    check_specs(segments)?;
    let residual_count = segments
        .iter()
        .filter(|s| matches!(s.source, SegmentSource::Residual))
        .count();

    let mut values: Vec<TimeSeries> = vec![TimeSeries::default(); segments.len()];
    let mut target_series = TimeSeries::default();
    let mut rescaled = Vec::new();
    let mut issues = Vec::new();

    for (year, t) in total.iter() {
        if !(t.is_finite() && t >= 0.0) {
            return Err(ReconcileError::InvalidTotal(year));
        }
        let mut row = vec![0.0; segments.len()];
        let mut bottom_up = 0.0;
        let mut allocated = 0.0;
        for (i, s) in segments.iter().enumerate() {
            match &s.source {
                SegmentSource::BottomUp { series, .. } => {
                    let v = series.get(year).ok_or_else(|| ReconcileError::MissingYear {
                        series: s.name.clone(),
                        year,
                    })?;
                    row[i] = v;
                    bottom_up += v;
                }
                SegmentSource::Allocated { share } => {
                    row[i] = t * share;
                    allocated += row[i];
                }
                SegmentSource::Residual => {}
            }
        }
        if residual_count > 0 {
            let each = (t - bottom_up - allocated).max(0.0) / residual_count as f64;
            for (i, s) in segments.iter().enumerate() {
                if matches!(s.source, SegmentSource::Residual) {
                    row[i] = each;
                }
            }
        }

        let target = match independent_total {
            Some(ind) => ind.get(year).ok_or_else(|| ReconcileError::MissingYear {
                series: "independent total".to_string(),
                year,
            })?,
            None => t,
        };
        let sum: f64 = row.iter().sum();
        let off = if target > 0.0 {
            (sum - target).abs() / target
        } else {
            sum.abs()
        };
        if off > cfg.tolerance {
            let low: f64 = segments
                .iter()
                .zip(&row)
                .filter(|(s, _)| !s.confidence().is_bottom_up())
                .map(|(_, v)| v)
                .sum();
            let need = target - bottom_up;
            let factor = if need <= 0.0 {
                issues.push(
                    ValidationIssue::error(
                        IssueKind::BottomUpExceedsTotal,
                        "reconciliation",
                        "bottom-up segments alone exceed the total; left unadjusted",
                    )
                    .at(year)
                    .magnitude(-need),
                );
                warn!(year, bottom_up, target, "bottom-up exceeds total");
                Some(0.0)
            } else if low > 0.0 {
                Some(need / low)
            } else {
                issues.push(
                    ValidationIssue::error(
                        IssueKind::SumMismatch,
                        "reconciliation",
                        "no low-confidence segment available to absorb the gap",
                    )
                    .at(year)
                    .magnitude(need),
                );
                None
            };
            if let Some(f) = factor {
                for (v, s) in row.iter_mut().zip(segments) {
                    if !s.confidence().is_bottom_up() {
                        *v *= f;
                    }
                }
                if low > 0.0 {
                    issues.push(
                        ValidationIssue::warning(
                            IssueKind::Rescaled,
                            "reconciliation",
                            format!("low-confidence segments scaled by {f:.6}"),
                        )
                        .at(year)
                        .magnitude(f),
                    );
                    rescaled.push((year, f));
                }
                debug!(year, factor = f, "rescaled low-confidence segments");
            }
        }

        for (series, v) in values.iter_mut().zip(row) {
            series.push(year, v)?;
        }
        target_series.push(year, target)?;
    }

    let records = segments
        .iter()
        .zip(values)
        .map(|(s, series)| DemandRecord {
            segment: s.name.clone(),
            kind: s.kind,
            confidence: s.confidence(),
            series,
        })
        .collect();

    Ok(ReconciliationResult {
        records,
        total: target_series,
        rescaled,
        issues,
    })
}
