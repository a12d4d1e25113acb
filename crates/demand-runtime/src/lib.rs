#![deny(warnings)]

//! Forecast pipeline: wires every stage into one pure run per region.
//!
//! Cost curves feed tipping detection; the tipping year anchors adoption and
//! the chimera hump; shares times the market forecast give powertrain demand;
//! ledgers turn demand into installed base and replacement demand; optional
//! reconciliation balances component segments; the validator runs last.
//! Degraded stages annotate the report instead of aborting the run.

use demand_adoption::AdoptionError;
use demand_core::{ConfigError, SeriesError};
use demand_econ::EconError;
use demand_reconcile::ReconcileError;
use demand_stock::StockError;
use thiserror::Error;

pub mod engine;
pub mod inputs;
pub mod strategy;

pub use engine::Engine;
pub use inputs::{
    Allocation, ForecastInputs, ForecastOutput, ReconciliationInputs, StockBaselines,
};
pub use strategy::{
    AdoptionModel, ConstantLifetime, CostModel, LogisticAdoption, RetirementProfile,
    StockFlowModel, WrightsLawCost,
};

/// Errors that stop a single region's run.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A required dataset is missing or too short for this region.
    #[error("insufficient data: {dataset} for region {region}")]
    InsufficientData { dataset: String, region: String },
    #[error(transparent)]
    Econ(#[from] EconError),
    #[error(transparent)]
    Adoption(#[from] AdoptionError),
    #[error(transparent)]
    Stock(#[from] StockError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Series(#[from] SeriesError),
}
