#![deny(warnings)]

//! Adoption models: logistic S-curve fitting and transitional-technology humps.
//!
//! The logistic fitter searches `(k, t0)` with a seeded differential-evolution
//! optimizer, so identical inputs always yield identical curves. Sparse data
//! and non-convergence degrade to seeded parameters and are reported as
//! warnings on the returned curve, never as errors.

use demand_core::SeriesError;
use thiserror::Error;

pub mod chimera;
pub mod logistic;
pub mod optimizer;

pub use chimera::{chimera_hump, ChimeraCurve};
pub use logistic::{extend_linear, fit_adoption, historical_shares, AdoptionCurve};
pub use optimizer::{differential_evolution, DeSettings, Optimum};

/// Errors produced by adoption models.
#[derive(Debug, Error, PartialEq)]
pub enum AdoptionError {
    /// No usable share observation at all.
    #[error("insufficient data: no usable share observations")]
    InsufficientData,
    #[error(transparent)]
    Series(#[from] SeriesError),
}
