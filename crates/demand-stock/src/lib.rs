#![deny(warnings)]

//! Installed-base ledger: stock-flow accounting of deployed assets.
//!
//! For every year `t` the ledger holds the opening stock `IB(t)`, the new
//! units added `adds(t)` and the retirements `scrappage(t)`, and guarantees
//! `IB(t+1) = IB(t) + adds(t) - scrappage(t)` bit-for-bit. Negative or NaN
//! stock is carried through untouched and surfaced by [`InstalledBaseLedger::integrity_issues`].

use demand_core::{IssueKind, SeriesError, TimeSeries, ValidationIssue, MAX_LIFETIME_YEARS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced while building a ledger.
#[derive(Debug, Error, PartialEq)]
pub enum StockError {
    #[error(transparent)]
    Series(#[from] SeriesError),
    /// Lifetimes must be finite, strictly positive and at most
    /// [`MAX_LIFETIME_YEARS`].
    #[error("invalid lifetime: {0}")]
    InvalidLifetime(f64),
    /// Retirement distributions need finite, non-negative weights with a
    /// positive sum, and no more ages than [`MAX_LIFETIME_YEARS`].
    #[error("invalid retirement distribution")]
    InvalidDistribution,
    /// No adds to account for.
    #[error("insufficient data: adds series is empty")]
    EmptyAdds,
}

/// How units leave the installed base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifetimeModel {
    /// `scrappage(t) = IB(t) / years`.
    Constant { years: f64 },
    /// Fraction of each vintage retired at age 1, 2, ... (`retirement[0]` is
    /// age 1). Weights are relative: the ledger rescales them to sum to 1,
    /// so every vintage retires in full by the last age. Opening baseline
    /// stock of unknown age retires at `1 / mean_age` per year.
    Distribution { retirement: Vec<f64> },
}

impl LifetimeModel {
    /// Checked copy of the model with distribution weights summing to 1.
    ///
    /// Example:
    /// let m = LifetimeModel::Distribution { retirement: vec![1.0, 3.0] };
    /// assert_eq!(m.normalized()?, LifetimeModel::Distribution { retirement: vec![0.25, 0.75] });
    pub fn normalized(&self) -> Result<Self, StockError> {
        match self {
            LifetimeModel::Constant { years } => {
                if years.is_finite() && *years > 0.0 && *years <= MAX_LIFETIME_YEARS {
                    Ok(self.clone())
                } else {
                    Err(StockError::InvalidLifetime(*years))
                }
            }
            LifetimeModel::Distribution { retirement } => {
                let total: f64 = retirement.iter().sum();
                let ok = !retirement.is_empty()
                    && retirement.len() as f64 <= MAX_LIFETIME_YEARS
                    && retirement.iter().all(|w| w.is_finite() && *w >= 0.0)
                    && total.is_finite()
                    && total > 0.0;
                if !ok {
                    return Err(StockError::InvalidDistribution);
                }
                if (total - 1.0).abs() > 1e-9 {
                    warn!(total, "retirement weights do not sum to 1; rescaled");
                }
                Ok(LifetimeModel::Distribution {
                    retirement: retirement.iter().map(|w| w / total).collect(),
                })
            }
        }
    }

    /// Expected age at retirement, in years.
    pub fn mean_lifetime(&self) -> f64 {
        match self {
            LifetimeModel::Constant { years } => *years,
            LifetimeModel::Distribution { retirement } => {
                let total: f64 = retirement.iter().sum();
                retirement
                    .iter()
                    .enumerate()
                    .map(|(i, w)| (i + 1) as f64 * w)
                    .sum::<f64>()
                    / total
            }
        }
    }

    /// Years needed to cycle through one full asset lifetime.
    fn full_cycle(&self) -> usize {
        match self {
            LifetimeModel::Constant { years } => years.ceil().max(1.0) as usize,
            LifetimeModel::Distribution { retirement } => retirement.len(),
        }
    }
}

/// Where the opening stock comes from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opening {
    /// Known stock at the start of the first adds year.
    Baseline(f64),
    /// No baseline: replay at least one full lifetime of adds from zero.
    /// `historical_years` is how many leading adds are observed data; when
    /// that is shorter than a lifetime the earliest value is replayed to
    /// make up the difference.
    WarmUp { historical_years: usize },
}

/// Stock-flow ledger for one (segment, powertrain) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstalledBaseLedger {
    /// Market segment the assets belong to, e.g. `passenger_vehicles`.
    pub segment: String,
    /// Powertrain within the segment: `disruptor`, `chimera` or `incumbent`.
    pub powertrain: String,
    /// Opening stock per year; one point longer than `adds`.
    pub stock: TimeSeries,
    /// New units entering service each year.
    pub adds: TimeSeries,
    /// Units retired each year, measured against the opening stock.
    pub scrappage: TimeSeries,
    /// Synthetic years replayed before the first adds year.
    pub warmup_years: usize,
}

struct Recurrence<'a> {
    model: &'a LifetimeModel,
    stock: f64,
    legacy: f64,
    vintages: Vec<f64>,
}

impl Recurrence<'_> {
    /// Advance one year; returns `(scrappage, closing stock)`.
    fn step(&mut self, adds: f64) -> (f64, f64) {
        let scrappage = match self.model {
            LifetimeModel::Constant { years } => self.stock / years,
            LifetimeModel::Distribution { retirement } => {
                let legacy_out = self.legacy / self.model.mean_lifetime();
                self.legacy -= legacy_out;
                let aged: f64 = self
                    .vintages
                    .iter()
                    .rev()
                    .zip(retirement)
                    .map(|(v, w)| v * w)
                    .sum();
                self.vintages.push(adds);
                if self.vintages.len() > retirement.len() {
                    self.vintages.remove(0);
                }
                // Rounding can push a fully retired cohort a hair past the
                // stock on hand.
                (legacy_out + aged).min(self.stock.max(0.0))
            }
        };
        let closing = self.stock + adds - scrappage;
        self.stock = closing;
        (scrappage, closing)
    }
}

impl InstalledBaseLedger {
    /// Run the stock-flow recurrence over `adds`.
    pub fn build(
        segment: impl Into<String>,
        powertrain: impl Into<String>,
        adds: &TimeSeries,
        opening: Opening,
        model: &LifetimeModel,
    ) -> Result<Self, StockError> {
        let model = &model.normalized()?;
        let (first, last) = match (adds.first_year(), adds.last_year()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(StockError::EmptyAdds),
        };
        let adds = adds.resample(first, last)?;
        let segment = segment.into();
        let powertrain = powertrain.into();

        let (baseline, warmup_years) = match opening {
            Opening::Baseline(b) => (b, 0),
            Opening::WarmUp { historical_years } => {
                (0.0, model.full_cycle().saturating_sub(historical_years))
            }
        };
        let mut rec = Recurrence {
            model,
            stock: baseline,
            legacy: baseline,
            vintages: Vec::new(),
        };
        let seed_adds = adds.values()[0];
        for _ in 0..warmup_years {
            rec.step(seed_adds);
        }
        if warmup_years > 0 {
            debug!(%segment, %powertrain, warmup_years, opening = rec.stock, "ledger warmed up");
        }

        let mut stock = TimeSeries::default();
        let mut scrappage = TimeSeries::default();
        stock.push(first, rec.stock)?;
        for (year, a) in adds.iter() {
            let (s, closing) = rec.step(a);
            scrappage.push(year, s)?;
            stock.push(year + 1, closing)?;
        }

        let ledger = Self {
            segment,
            powertrain,
            stock,
            adds,
            scrappage,
            warmup_years,
        };
        if let Some(bad) = ledger.integrity_issues().first() {
            warn!(issue = %bad, "installed base is inconsistent");
        }
        Ok(ledger)
    }

    fn label(&self) -> String {
        format!("{}/{}", self.segment, self.powertrain)
    }

    /// Opening stock at `year`.
    pub fn stock_at(&self, year: i32) -> Option<f64> {
        self.stock.get(year)
    }

    /// Largest `|IB(t+1) - (IB(t) + adds(t) - scrappage(t))|` over the ledger.
    pub fn max_closure_error(&self) -> f64 {
        self.adds
            .iter()
            .zip(self.scrappage.values())
            .map(|((year, a), s)| match (self.stock.get(year), self.stock.get(year + 1)) {
                (Some(open), Some(close)) => (close - (open + a - s)).abs(),
                _ => f64::INFINITY,
            })
            .fold(0.0, f64::max)
    }

    /// Hard failures: negative or non-finite stock, broken accounting.
    pub fn integrity_issues(&self) -> Vec<ValidationIssue> {
        let label = self.label();
        let mut issues = Vec::new();
        for (year, v) in self.stock.iter() {
            if !v.is_finite() {
                issues.push(
                    ValidationIssue::error(IssueKind::NonFinite, &label, "stock is not finite")
                        .at(year),
                );
            } else if v < 0.0 {
                issues.push(
                    ValidationIssue::error(
                        IssueKind::NegativeValue,
                        &label,
                        "negative installed base; adds and lifetime are inconsistent",
                    )
                    .at(year)
                    .magnitude(v),
                );
            }
        }
        let closure = self.max_closure_error();
        if closure.is_nan() || closure > 0.0 {
            issues.push(
                ValidationIssue::error(
                    IssueKind::StockFlowBroken,
                    &label,
                    "IB(t+1) != IB(t) + adds(t) - scrappage(t)",
                )
                .magnitude(closure),
            );
        }
        issues
    }

    /// Component replacement demand `IB(t) / component_lifetime` for every
    /// adds year. Distinct from asset scrappage.
    pub fn replacement_demand(&self, component_lifetime: f64) -> Result<TimeSeries, StockError> {
        if !(component_lifetime.is_finite() && component_lifetime > 0.0) {
            return Err(StockError::InvalidLifetime(component_lifetime));
        }
        let mut out = TimeSeries::default();
        for year in self.adds.years() {
            if let Some(ib) = self.stock.get(*year) {
                out.push(*year, ib / component_lifetime)?;
            }
        }
        Ok(out)
    }
}

/// OEM and replacement component demand derived from one ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentDemand {
    /// Components fitted to new assets: `adds(t) * units_per_asset`.
    pub oem: TimeSeries,
    /// Components replacing worn-out ones: `IB(t) / component_lifetime * units_per_asset`.
    pub replacement: TimeSeries,
}

/// Split a ledger's component demand into OEM and replacement streams.
pub fn component_demand(
    ledger: &InstalledBaseLedger,
    component_lifetime: f64,
    units_per_asset: f64,
) -> Result<ComponentDemand, StockError> {
    Ok(ComponentDemand {
        oem: ledger.adds.map(|_, a| a * units_per_asset),
        replacement: ledger
            .replacement_demand(component_lifetime)?
            .map(|_, r| r * units_per_asset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flat(start: i32, end: i32, v: f64) -> TimeSeries {
        TimeSeries::from_fn(start, end, |_| v)
    }

    #[test]
    fn constant_lifetime_recurrence() {
        let adds = flat(2020, 2022, 10.0);
        let l = InstalledBaseLedger::build(
            "car",
            "bev",
            &adds,
            Opening::Baseline(100.0),
            &LifetimeModel::Constant { years: 10.0 },
        )
        .unwrap();
        assert_eq!(l.stock.years(), &[2020, 2021, 2022, 2023]);
        assert_eq!(l.scrappage.get(2020), Some(10.0));
        assert_eq!(l.stock_at(2021), Some(100.0));
        assert_eq!(l.max_closure_error(), 0.0);
        assert!(l.integrity_issues().is_empty());
    }

    #[test]
    fn warm_up_replays_one_lifetime() {
        let adds = flat(2020, 2030, 10.0);
        let l = InstalledBaseLedger::build(
            "car",
            "ice",
            &adds,
            Opening::WarmUp { historical_years: 3 },
            &LifetimeModel::Constant { years: 8.0 },
        )
        .unwrap();
        assert_eq!(l.warmup_years, 5);
        // Five years of 10/yr from zero with 1/8 retirement.
        let expected = 10.0 * 8.0 * (1.0 - (7.0f64 / 8.0).powi(5));
        assert!((l.stock_at(2020).unwrap() - expected).abs() < 1e-9);
        assert!(l.stock_at(2030).unwrap() > l.stock_at(2020).unwrap());
    }

    #[test]
    fn long_history_needs_no_synthetic_years() {
        let adds = flat(2000, 2030, 5.0);
        let l = InstalledBaseLedger::build(
            "bus",
            "bev",
            &adds,
            Opening::WarmUp { historical_years: 25 },
            &LifetimeModel::Constant { years: 12.0 },
        )
        .unwrap();
        assert_eq!(l.warmup_years, 0);
        assert_eq!(l.stock_at(2000), Some(0.0));
    }

    #[test]
    fn distribution_retires_vintages() {
        let adds = flat(2020, 2025, 10.0);
        let l = InstalledBaseLedger::build(
            "ups",
            "li-ion",
            &adds,
            Opening::Baseline(0.0),
            &LifetimeModel::Distribution {
                retirement: vec![0.0, 1.0],
            },
        )
        .unwrap();
        assert_eq!(l.stock_at(2021), Some(10.0));
        assert_eq!(l.stock_at(2022), Some(20.0));
        assert_eq!(l.scrappage.get(2022), Some(10.0));
        assert_eq!(l.stock_at(2026), Some(20.0));
        assert_eq!(l.max_closure_error(), 0.0);
    }

    #[test]
    fn distribution_weights_are_rescaled_to_one() {
        let build = |adds: &TimeSeries, retirement: Vec<f64>| {
            InstalledBaseLedger::build(
                "ups",
                "li-ion",
                adds,
                Opening::Baseline(0.0),
                &LifetimeModel::Distribution { retirement },
            )
            .unwrap()
        };
        let adds = flat(2020, 2040, 10.0);

        // Over-full profile: three equal thirds, steady state is adds * mean age.
        let l = build(&adds, vec![0.5, 0.5, 0.5]);
        assert!(l.integrity_issues().is_empty(), "{:?}", l.integrity_issues());
        assert!((l.stock_at(2041).unwrap() - 20.0).abs() < 1e-9);

        // Under-full profile: halves, so nothing lingers past age 2.
        let l = build(&adds, vec![0.1, 0.1]);
        assert!((l.stock_at(2041).unwrap() - 15.0).abs() < 1e-9);

        // A single weight of any size retires the whole vintage once.
        let pulse = TimeSeries::new(vec![2020, 2021, 2022], vec![10.0, 0.0, 0.0]).unwrap();
        let l = build(&pulse, vec![10.0]);
        assert_eq!(l.stock.values(), &[0.0, 10.0, 0.0, 0.0]);
        assert_eq!(l.scrappage.values().iter().sum::<f64>(), 10.0);

        let m = LifetimeModel::Distribution {
            retirement: vec![1.0, 3.0],
        };
        assert_eq!(
            m.normalized().unwrap(),
            LifetimeModel::Distribution {
                retirement: vec![0.25, 0.75]
            }
        );
    }

    #[test]
    fn rejects_unusable_distributions_and_huge_lifetimes() {
        let adds = flat(2020, 2022, 1.0);
        for retirement in [vec![0.0, 0.0], vec![0.5, -0.1], vec![f64::NAN], vec![0.01; 201]] {
            let err = InstalledBaseLedger::build(
                "a",
                "b",
                &adds,
                Opening::WarmUp { historical_years: 0 },
                &LifetimeModel::Distribution { retirement },
            );
            assert_eq!(err, Err(StockError::InvalidDistribution));
        }
        let err = InstalledBaseLedger::build(
            "a",
            "b",
            &adds,
            Opening::WarmUp { historical_years: 0 },
            &LifetimeModel::Constant { years: 1e9 },
        );
        assert_eq!(err, Err(StockError::InvalidLifetime(1e9)));
    }

    #[test]
    fn negative_stock_is_reported_not_clamped() {
        let adds = flat(2020, 2022, 0.0);
        let l = InstalledBaseLedger::build(
            "car",
            "ice",
            &adds,
            Opening::Baseline(100.0),
            &LifetimeModel::Constant { years: 0.5 },
        )
        .unwrap();
        assert_eq!(l.stock_at(2021), Some(-100.0));
        let issues = l.integrity_issues();
        assert!(issues.iter().any(|i| i.kind == IssueKind::NegativeValue && i.year == Some(2021)));
    }

    #[test]
    fn rejects_bad_lifetimes() {
        let adds = flat(2020, 2022, 1.0);
        let err = InstalledBaseLedger::build("a", "b", &adds, Opening::Baseline(0.0), &LifetimeModel::Constant { years: 0.0 });
        assert_eq!(err, Err(StockError::InvalidLifetime(0.0)));
        let err = InstalledBaseLedger::build(
            "a",
            "b",
            &adds,
            Opening::Baseline(0.0),
            &LifetimeModel::Distribution { retirement: vec![] },
        );
        assert_eq!(err, Err(StockError::InvalidDistribution));
        let err = InstalledBaseLedger::build("a", "b", &TimeSeries::default(), Opening::Baseline(0.0), &LifetimeModel::Constant { years: 5.0 });
        assert_eq!(err, Err(StockError::EmptyAdds));
    }

    #[test]
    fn replacement_uses_component_lifetime() {
        let adds = flat(2020, 2021, 0.0);
        let l = InstalledBaseLedger::build(
            "car",
            "bev",
            &adds,
            Opening::Baseline(800.0),
            &LifetimeModel::Constant { years: 16.0 },
        )
        .unwrap();
        let demand = component_demand(&l, 8.0, 2.0).unwrap();
        assert_eq!(demand.replacement.get(2020), Some(200.0));
        assert_eq!(demand.replacement.get(2021), Some(187.5));
        assert_eq!(demand.oem.get(2021), Some(0.0));
        assert!(l.replacement_demand(0.0).is_err());
    }

    #[test]
    fn lifetime_model_serde_is_tagged() {
        let m: LifetimeModel = serde_json::from_str(r#"{"type":"constant","years":12.0}"#).unwrap();
        assert_eq!(m, LifetimeModel::Constant { years: 12.0 });
        let d = LifetimeModel::Distribution {
            retirement: vec![0.25, 0.5, 0.25],
        };
        assert!((d.mean_lifetime() - 2.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn stock_flow_closes_exactly(
            adds in proptest::collection::vec(0.0f64..1e6, 1..40),
            lifetime in 1.0f64..30.0,
            baseline in proptest::option::of(0.0f64..1e7),
        ) {
            let series = TimeSeries::new((2000..2000 + adds.len() as i32).collect(), adds).unwrap();
            let opening = match baseline {
                Some(b) => Opening::Baseline(b),
                None => Opening::WarmUp { historical_years: 0 },
            };
            let l = InstalledBaseLedger::build("s", "p", &series, opening, &LifetimeModel::Constant { years: lifetime }).unwrap();
            prop_assert!(l.max_closure_error() < f64::EPSILON);
            prop_assert!(l.stock.values().iter().all(|v| *v >= 0.0));
        }

        #[test]
        fn distribution_ledger_closes_and_stays_non_negative(
            adds in proptest::collection::vec(0.0f64..1e6, 1..40),
            weights in proptest::collection::vec(0.0f64..2.0, 1..15),
            historical_years in 0usize..20,
            baseline in proptest::option::of(0.0f64..1e7),
        ) {
            prop_assume!(weights.iter().sum::<f64>() > 1e-3);
            let series = TimeSeries::new((2000..2000 + adds.len() as i32).collect(), adds).unwrap();
            let opening = match baseline {
                Some(b) => Opening::Baseline(b),
                None => Opening::WarmUp { historical_years },
            };
            let model = LifetimeModel::Distribution { retirement: weights };
            let l = InstalledBaseLedger::build("s", "p", &series, opening, &model).unwrap();
            prop_assert_eq!(l.max_closure_error(), 0.0);
            prop_assert!(l.stock.values().iter().all(|v| *v >= 0.0));
            prop_assert!(l.integrity_issues().is_empty());
        }
    }
}
