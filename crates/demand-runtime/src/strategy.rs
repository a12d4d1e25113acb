//! Injectable model strategies.
//!
//! Domain differences live in configuration; these traits only exist so a
//! caller can swap the cost, adoption or retirement model wholesale.

use demand_adoption::{fit_adoption, AdoptionCurve, AdoptionError};
use demand_core::{AdoptionConfig, CostConfig, StockConfig, TimeSeries};
use demand_econ::{forecast_cost_curve, CostForecast, EconError};
use demand_stock::LifetimeModel;

/// Extends a historical cost series to the horizon.
pub trait CostModel {
    fn extend(
        &self,
        history: &TimeSeries,
        horizon_end: i32,
        cfg: &CostConfig,
    ) -> Result<CostForecast, EconError>;
}

/// Projects disruptor market share from history and the tipping year.
pub trait AdoptionModel {
    fn fit(
        &self,
        shares: &TimeSeries,
        tipping_year: Option<i32>,
        horizon_end: i32,
        cfg: &AdoptionConfig,
    ) -> Result<AdoptionCurve, AdoptionError>;
}

/// Chooses how assets retire from the installed base.
pub trait StockFlowModel {
    fn lifetime(&self, cfg: &StockConfig) -> LifetimeModel;
}

/// Smoothed log-linear extrapolation (Wright's-Law style).
#[derive(Clone, Copy, Debug, Default)]
pub struct WrightsLawCost;

impl CostModel for WrightsLawCost {
    fn extend(
        &self,
        history: &TimeSeries,
        horizon_end: i32,
        cfg: &CostConfig,
    ) -> Result<CostForecast, EconError> {
        forecast_cost_curve(history, horizon_end, cfg)
    }
}

/// Logistic S-curve fitted with differential evolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogisticAdoption;

impl AdoptionModel for LogisticAdoption {
    fn fit(
        &self,
        shares: &TimeSeries,
        tipping_year: Option<i32>,
        horizon_end: i32,
        cfg: &AdoptionConfig,
    ) -> Result<AdoptionCurve, AdoptionError> {
        fit_adoption(shares, tipping_year, horizon_end, cfg)
    }
}

/// `scrappage = IB / asset_lifetime`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantLifetime;

impl StockFlowModel for ConstantLifetime {
    fn lifetime(&self, cfg: &StockConfig) -> LifetimeModel {
        LifetimeModel::Constant {
            years: cfg.asset_lifetime,
        }
    }
}

/// Age-indexed retirement profile shared by every powertrain. Weights are
/// relative; the ledger rescales them to sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct RetirementProfile(pub Vec<f64>);

impl StockFlowModel for RetirementProfile {
    fn lifetime(&self, _cfg: &StockConfig) -> LifetimeModel {
        LifetimeModel::Distribution {
            retirement: self.0.clone(),
        }
    }
}
