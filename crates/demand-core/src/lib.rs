#![deny(warnings)]

//! Core data model for the disruption demand forecasting engine.
//!
//! This crate defines the serializable types shared by every stage of the
//! pipeline, with validation helpers guaranteeing their basic invariants:
//! - `TimeSeries`: strictly increasing integer years with float values
//! - `ForecastConfig`: the immutable configuration passed into every stage
//! - `ValidationReport`: itemized pass/fail findings collected along a run
//! - shared statistics (median, OLS, Theil-Sen) used by the fitters

pub mod config;
pub mod model;
pub mod report;
pub mod series;
pub mod stats;

pub use config::{
    AdoptionConfig, ChimeraConfig, ConfigError, CostConfig, ForecastConfig, MarketConfig,
    ReconcileConfig, StockConfig, ValidationConfig, MAX_LIFETIME_YEARS,
};
pub use model::{
    AdoptionMethod, Confidence, DemandKind, ForecastRow, ForecastTable, LogisticParams,
    TippingConfidence, TippingPoint,
};
pub use report::{IssueKind, Severity, ValidationIssue, ValidationReport};
pub use series::{SeriesError, TimeSeries, MIN_USABLE_POINTS};
pub use stats::LinearFit;
