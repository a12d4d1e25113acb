//! Derived forecast entities shared across stages.

use serde::{Deserialize, Serialize};

use crate::series::{SeriesError, TimeSeries};

/// How directly a demand contribution was derived from driver data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    HighBottomUp,
    MediumBottomUp,
    LowAllocated,
    LowResidual,
}

impl Confidence {
    /// Bottom-up contributions are never adjusted during reconciliation.
    pub fn is_bottom_up(self) -> bool {
        matches!(self, Confidence::HighBottomUp | Confidence::MediumBottomUp)
    }
}

/// Label of a demand contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandKind {
    /// Components fitted to newly sold assets.
    Oem,
    /// Components replacing worn-out ones in the installed base.
    Replacement,
    /// New-build demand for a named end use.
    NewBuild,
    /// Fixed share of a larger total.
    Allocated,
    /// Whatever remains of the total.
    Residual,
}

/// Qualifier attached to a detected tipping point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TippingConfidence {
    /// Disruptor was already cheaper in the first comparable year.
    AlreadyAchieved,
    /// Crossing observed inside historical data.
    Historical,
    /// Crossing only occurs in extrapolated costs.
    Projected,
    /// No crossing through the horizon.
    NotReached,
}

/// Outcome of cost-parity detection. Immutable once computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TippingPoint {
    pub year: Option<i32>,
    pub disruptor_cagr: f64,
    pub incumbent_cagr: f64,
    pub confidence: TippingConfidence,
}

/// Logistic adoption parameters `share(t) = L / (1 + exp(-k (t - t0)))`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Ceiling `L` in (0, 1].
    pub ceiling: f64,
    /// Steepness `k`.
    pub k: f64,
    /// Inflection year `t0`.
    pub t0: f64,
}

impl LogisticParams {
    /// Share at (possibly fractional) year `t`, clipped to `[0, L]`.
    ///
    /// Example:
    /// let p = LogisticParams { ceiling: 0.8, k: 0.5, t0: 2030.0 };
    /// assert_eq!(p.share(2030.0), 0.4);
    pub fn share(&self, t: f64) -> f64 {
        let s = self.ceiling / (1.0 + (-self.k * (t - self.t0)).exp());
        if s.is_finite() {
            s.clamp(0.0, self.ceiling)
        } else {
            0.0
        }
    }
}

/// Path used to produce the disruptor share forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdoptionMethod {
    /// Optimizer converged on fitted parameters.
    Logistic,
    /// Seeded `(k, t0)` used after sparse data or non-convergence.
    HeuristicFallback,
    /// No tipping point: slow capped linear trend.
    LinearNoTipping,
}

/// One year of the forecast output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub year: i32,
    /// True for years backed by observed total demand.
    pub historical: bool,
    pub market_demand: f64,
    pub disruptor_demand: f64,
    pub chimera_demand: f64,
    pub incumbent_demand: f64,
    pub disruptor_share: f64,
    pub chimera_share: f64,
    pub incumbent_share: f64,
    pub disruptor_cost: Option<f64>,
    pub incumbent_cost: Option<f64>,
    pub disruptor_stock: Option<f64>,
    pub chimera_stock: Option<f64>,
    pub incumbent_stock: Option<f64>,
    pub replacement_demand: Option<f64>,
}

/// Year-keyed forecast table, rows in strictly increasing year order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row; its year must follow the previous row.
    pub fn push(&mut self, row: ForecastRow) -> Result<(), SeriesError> {
        if let Some(prev) = self.rows.last() {
            if row.year <= prev.year {
                return Err(SeriesError::NotIncreasing {
                    prev: prev.year,
                    next: row.year,
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ForecastRow] {
        &mut self.rows
    }

    pub fn row(&self, year: i32) -> Option<&ForecastRow> {
        self.rows
            .binary_search_by_key(&year, |r| r.year)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Extract one column as a time series.
    pub fn column(&self, f: impl Fn(&ForecastRow) -> f64) -> TimeSeries {
        TimeSeries::from_sorted(
            self.rows.iter().map(|r| r.year).collect(),
            self.rows.iter().map(f).collect(),
        )
    }

    /// Extract an optional column, keeping only years where it is present.
    pub fn optional_column(&self, f: impl Fn(&ForecastRow) -> Option<f64>) -> TimeSeries {
        let (years, values) = self
            .rows
            .iter()
            .filter_map(|r| f(r).map(|v| (r.year, v)))
            .unzip();
        TimeSeries::from_sorted(years, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn logistic_midpoint_is_half_ceiling() {
        let p = LogisticParams {
            ceiling: 0.8,
            k: 0.5,
            t0: 2030.0,
        };
        assert!((p.share(2030.0) - 0.4).abs() < 1e-12);
        assert!(p.share(1900.0) < 1e-6);
        assert!((p.share(2200.0) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn table_rejects_out_of_order_rows() {
        let mut t = ForecastTable::new();
        t.push(ForecastRow {
            year: 2020,
            ..Default::default()
        })
        .unwrap();
        assert!(t
            .push(ForecastRow {
                year: 2020,
                ..Default::default()
            })
            .is_err());
        t.push(ForecastRow {
            year: 2021,
            market_demand: 5.0,
            disruptor_cost: Some(1.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(t.column(|r| r.market_demand).get(2021), Some(5.0));
        assert_eq!(t.optional_column(|r| r.disruptor_cost).years(), &[2021]);
        assert_eq!(t.row(2021).map(|r| r.year), Some(2021));
    }

    #[test]
    fn confidence_serializes_screaming() {
        let s = serde_json::to_string(&Confidence::LowResidual).unwrap();
        assert_eq!(s, "\"LOW_RESIDUAL\"");
        assert!(Confidence::MediumBottomUp.is_bottom_up());
        assert!(!Confidence::LowAllocated.is_bottom_up());
    }

    proptest! {
        #[test]
        fn logistic_share_within_bounds(l in 0.01f64..=1.0, k in 0.05f64..1.5, t0 in 2000.0f64..2060.0, t in 1900i32..2200) {
            let p = LogisticParams { ceiling: l, k, t0 };
            let s = p.share(f64::from(t));
            prop_assert!(s >= 0.0 && s <= l);
        }
    }
}
