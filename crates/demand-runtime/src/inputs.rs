//! Plain inputs and outputs of one forecast run.

use demand_adoption::ChimeraCurve;
use demand_core::{
    AdoptionMethod, ForecastTable, LogisticParams, TimeSeries, TippingPoint, ValidationReport,
};
use demand_econ::{CostForecast, MarketForecast};
use demand_reconcile::ReconciliationResult;
use demand_stock::InstalledBaseLedger;
use serde::{Deserialize, Serialize};

/// Known opening stock per powertrain. Missing entries are warmed up.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockBaselines {
    /// Disruptor units in service at the start of the first sales year.
    pub disruptor: Option<f64>,
    /// Chimera units in service at the start of the first sales year.
    pub chimera: Option<f64>,
    /// Incumbent units in service at the start of the first sales year.
    pub incumbent: Option<f64>,
}

/// A fixed-share segment of the component total.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Segment label in the reconciliation result.
    pub name: String,
    /// Fraction of the component total, in `[0, 1]`.
    pub share: f64,
}

/// Component-level reconciliation inputs.
///
/// OEM demand (HIGH) and replacement demand (MEDIUM) come from the asset
/// forecast; the allocations and the optional residual fill the rest of the
/// component total.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationInputs {
    /// Historical total component demand, forecast with the market model.
    pub total_history: TimeSeries,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub residual_segment: Option<String>,
    /// Independently known total to check against, if any.
    #[serde(default)]
    pub independent_total: Option<TimeSeries>,
}

/// Historical series for one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastInputs {
    pub region: String,
    /// Product/asset segment label, e.g. "passenger_vehicles".
    pub segment: String,
    pub disruptor_cost: TimeSeries,
    pub incumbent_cost: TimeSeries,
    pub total_sales: TimeSeries,
    pub disruptor_sales: TimeSeries,
    #[serde(default)]
    pub chimera_sales: Option<TimeSeries>,
    #[serde(default)]
    pub stock_baselines: StockBaselines,
    #[serde(default)]
    pub reconciliation: Option<ReconciliationInputs>,
}

impl ForecastInputs {
    /// Copy with every observed series cut off after `last_year`.
    pub fn up_to(&self, last_year: i32) -> Self {
        let clip = |s: &TimeSeries| s.between(i32::MIN, last_year);
        Self {
            region: self.region.clone(),
            segment: self.segment.clone(),
            disruptor_cost: clip(&self.disruptor_cost),
            incumbent_cost: clip(&self.incumbent_cost),
            total_sales: clip(&self.total_sales),
            disruptor_sales: clip(&self.disruptor_sales),
            chimera_sales: self.chimera_sales.as_ref().map(clip),
            stock_baselines: self.stock_baselines.clone(),
            reconciliation: self.reconciliation.as_ref().map(|r| ReconciliationInputs {
                total_history: clip(&r.total_history),
                allocations: r.allocations.clone(),
                residual_segment: r.residual_segment.clone(),
                independent_total: r.independent_total.as_ref().map(clip),
            }),
        }
    }

    /// Latest year in any of the asset-level series.
    pub fn last_observed_year(&self) -> Option<i32> {
        [
            &self.disruptor_cost,
            &self.incumbent_cost,
            &self.total_sales,
            &self.disruptor_sales,
        ]
        .into_iter()
        .chain(self.chimera_sales.as_ref())
        .filter_map(TimeSeries::last_year)
        .max()
    }
}

/// Everything a run produces, ready for serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub region: String,
    pub segment: String,
    pub scenario: String,
    pub horizon_end: i32,
    pub tipping: TippingPoint,
    pub adoption_method: AdoptionMethod,
    pub logistic: Option<LogisticParams>,
    pub chimera: Option<ChimeraCurve>,
    pub disruptor_cost: CostForecast,
    pub incumbent_cost: CostForecast,
    pub market: MarketForecast,
    pub table: ForecastTable,
    pub ledgers: Vec<InstalledBaseLedger>,
    pub reconciliation: Option<ReconciliationResult>,
    pub report: ValidationReport,
}
