#![deny(warnings)]

//! Post-run validation of a complete forecast.
//!
//! Checks never abort: every violated invariant becomes an itemized
//! [`ValidationIssue`] naming the segment, year and size of the violation.
//! Excessive growth is a warning; everything else is an error.

use demand_core::{
    ForecastTable, IssueKind, TimeSeries, ValidationConfig, ValidationIssue, ValidationReport,
};
use demand_reconcile::ReconciliationResult;
use demand_stock::InstalledBaseLedger;
use tracing::{debug, warn};

/// Accumulates findings over any number of checks.
pub struct Validator<'a> {
    cfg: &'a ValidationConfig,
    report: ValidationReport,
}

impl<'a> Validator<'a> {
    pub fn new(cfg: &'a ValidationConfig) -> Self {
        Self {
            cfg,
            report: ValidationReport::new(),
        }
    }

    /// Carry upstream findings (fallbacks, clamps) into the report.
    pub fn record(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) -> &mut Self {
        self.report.extend(issues);
        self
    }

    /// Every value must be finite and `>= 0`.
    pub fn non_negative(&mut self, segment: &str, series: &TimeSeries) -> &mut Self {
        for (year, v) in series.iter() {
            if !v.is_finite() {
                self.report.push(
                    ValidationIssue::error(IssueKind::NonFinite, segment, "value is not finite")
                        .at(year),
                );
            } else if v < 0.0 {
                self.report.push(
                    ValidationIssue::error(IssueKind::NegativeValue, segment, "negative demand")
                        .at(year)
                        .magnitude(v),
                );
            }
        }
        self
    }

    /// Every share must lie in `[0, upper]`, up to `share_epsilon`.
    pub fn share_bounds(&mut self, segment: &str, series: &TimeSeries, upper: f64) -> &mut Self {
        let eps = self.cfg.share_epsilon;
        for (year, s) in series.iter() {
            let excess = if s.is_nan() {
                f64::NAN
            } else if s < -eps {
                s
            } else if s > upper + eps {
                s - upper
            } else {
                continue;
            };
            self.report.push(
                ValidationIssue::error(
                    IssueKind::ShareOutOfBounds,
                    segment,
                    format!("share {s:.6} outside [0, {upper}]"),
                )
                .at(year)
                .magnitude(excess),
            );
        }
        self
    }

    /// `sum(parts)` must match `total` within `sum_tolerance` (relative) for
    /// every year of `total`.
    pub fn sum_consistency(
        &mut self,
        segment: &str,
        parts: &[&TimeSeries],
        total: &TimeSeries,
    ) -> &mut Self {
        let tol = self.cfg.sum_tolerance;
        for (year, t) in total.iter() {
            let mut sum = 0.0;
            let mut missing = false;
            for p in parts {
                match p.get(year) {
                    Some(v) => sum += v,
                    None => missing = true,
                }
            }
            if missing {
                self.report.push(
                    ValidationIssue::error(
                        IssueKind::InsufficientData,
                        segment,
                        "a component has no value for this year",
                    )
                    .at(year),
                );
                continue;
            }
            let gap = sum - t;
            let rel = if t.abs() > 0.0 { gap.abs() / t.abs() } else { gap.abs() };
            if !(rel <= tol) {
                self.report.push(
                    ValidationIssue::error(
                        IssueKind::SumMismatch,
                        segment,
                        format!("segments sum to {sum:.6}, total is {t:.6}"),
                    )
                    .at(year)
                    .magnitude(gap),
                );
            }
        }
        self
    }

    /// Flag year-over-year changes larger than `growth_warning`.
    pub fn growth(&mut self, segment: &str, series: &TimeSeries) -> &mut Self {
        let bound = self.cfg.growth_warning;
        for (year, g) in series.growth_rates() {
            if g.abs() > bound {
                self.report.push(
                    ValidationIssue::warning(
                        IssueKind::ExcessiveGrowth,
                        segment,
                        format!("year-over-year change {:.1}%", g * 100.0),
                    )
                    .at(year)
                    .magnitude(g),
                );
            }
        }
        self
    }

    /// Stock-flow closure and stock sign for an installed-base ledger.
    pub fn ledger(&mut self, ledger: &InstalledBaseLedger) -> &mut Self {
        self.report.extend(ledger.integrity_issues());
        self
    }

    /// Non-negativity of every record and closure against the reconciled total.
    pub fn reconciliation(&mut self, result: &ReconciliationResult) -> &mut Self {
        self.report.extend(result.issues.iter().cloned());
        for r in &result.records {
            self.non_negative(&r.segment, &r.series);
        }
        let parts: Vec<&TimeSeries> = result.records.iter().map(|r| &r.series).collect();
        self.sum_consistency("reconciled total", &parts, &result.total)
    }

    /// Table-level invariants: non-negative demand, share bounds, shares
    /// summing to one, powertrain demand summing to the market, and market
    /// growth.
    pub fn table(&mut self, table: &ForecastTable, ceiling: f64) -> &mut Self {
        let market = table.column(|r| r.market_demand);
        let disruptor = table.column(|r| r.disruptor_demand);
        let chimera = table.column(|r| r.chimera_demand);
        let incumbent = table.column(|r| r.incumbent_demand);
        self.non_negative("market", &market)
            .non_negative("disruptor", &disruptor)
            .non_negative("chimera", &chimera)
            .non_negative("incumbent", &incumbent);

        let d_share = table.column(|r| r.disruptor_share);
        let c_share = table.column(|r| r.chimera_share);
        let i_share = table.column(|r| r.incumbent_share);
        self.share_bounds("disruptor share", &d_share, ceiling)
            .share_bounds("chimera share", &c_share, 1.0)
            .share_bounds("incumbent share", &i_share, 1.0);

        let ones = table.column(|_| 1.0);
        self.sum_consistency("shares", &[&d_share, &c_share, &i_share], &ones)
            .sum_consistency("market", &[&disruptor, &chimera, &incumbent], &market)
            .growth("market", &market);

        let replacement = table.optional_column(|r| r.replacement_demand);
        self.non_negative("replacement", &replacement)
    }

    pub fn finish(self) -> ValidationReport {
        let errors = self.report.errors().count();
        if errors > 0 {
            warn!(errors, "forecast failed validation");
        } else {
            debug!(warnings = self.report.warnings().count(), "forecast passed validation");
        }
        self.report
    }
}

/// Validate a complete forecast output in one call.
pub fn validate_forecast(
    table: &ForecastTable,
    ledgers: &[InstalledBaseLedger],
    reconciliation: Option<&ReconciliationResult>,
    ceiling: f64,
    cfg: &ValidationConfig,
) -> ValidationReport {
    let mut v = Validator::new(cfg);
    v.table(table, ceiling);
    for l in ledgers {
        v.ledger(l);
    }
    if let Some(r) = reconciliation {
        v.reconciliation(r);
    }
    v.finish()
}
