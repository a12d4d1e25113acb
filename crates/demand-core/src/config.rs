//! Immutable forecast configuration.
//!
//! Every stage receives the section it needs by reference. Domain differences
//! (vehicles vs. batteries vs. generation) live entirely in these values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest asset or component lifetime a ledger will replay, in years.
pub const MAX_LIFETIME_YEARS: f64 = 200.0;

/// Configuration values that cannot describe a meaningful run.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A numeric field is NaN or infinite.
    #[error("{0} must be finite")]
    NonFinite(&'static str),
    /// A field that must be strictly positive is not.
    #[error("{0} must be > 0")]
    NonPositive(&'static str),
    /// A fraction lies outside its permitted interval.
    #[error("{field} must be within {range}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
    },
    /// Lower bound is above upper bound.
    #[error("bounds for {0} are inverted")]
    InvertedBounds(&'static str),
}

/// Cost Curve Processor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Rolling-median window in years.
    pub smoothing_window: usize,
    /// Lowest CAGR allowed for extrapolation (e.g. -0.5 = -50%/yr).
    pub min_cagr: f64,
    /// Highest CAGR allowed for extrapolation (e.g. 1.0 = +100%/yr).
    pub max_cagr: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 3,
            min_cagr: -0.5,
            max_cagr: 1.0,
        }
    }
}

/// Market Demand Forecaster settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Symmetric cap on implied annual growth, e.g. 0.05 = +/-5%.
    pub growth_cap: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self { growth_cap: 0.05 }
    }
}

/// Adoption Curve Fitter settings, including the optimizer budget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdoptionConfig {
    /// Logistic ceiling `L` in (0, 1].
    pub ceiling: f64,
    pub k_min: f64,
    pub k_max: f64,
    /// Half-width in years of the `t0` search interval around the tipping year.
    pub t0_window: f64,
    /// Steepness used when the fit is skipped or fails.
    pub fallback_k: f64,
    /// Fewer usable share observations than this skips the optimizer.
    pub min_fit_points: usize,
    /// Number of most recent points used for linear trend extension.
    pub trend_window: usize,
    /// Fraction of `ceiling` the no-tipping linear path may reach.
    pub no_tipping_cap: f64,
    pub population: usize,
    pub generations: usize,
    pub seed: u64,
    pub convergence_tol: f64,
}

impl Default for AdoptionConfig {
    fn default() -> Self {
        Self {
            ceiling: 0.9,
            k_min: 0.05,
            k_max: 1.5,
            t0_window: 5.0,
            fallback_k: 0.4,
            min_fit_points: 3,
            trend_window: 5,
            no_tipping_cap: 0.25,
            population: 30,
            generations: 400,
            seed: 42,
            convergence_tol: 1e-8,
        }
    }
}

/// Transitional (chimera) technology settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeraConfig {
    /// Peak market share reached at the tipping year.
    pub peak_share: f64,
    /// Post-tipping decay half-life in years.
    pub half_life: f64,
}

impl Default for ChimeraConfig {
    fn default() -> Self {
        Self {
            peak_share: 0.15,
            half_life: 3.0,
        }
    }
}

/// Installed-base ledger settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    /// Mean service life of the asset in years.
    pub asset_lifetime: f64,
    /// Service life of the replaceable sub-component (e.g. a battery).
    /// When absent no replacement demand is derived.
    pub component_lifetime: Option<f64>,
    /// Components per asset, used for OEM and replacement demand.
    pub units_per_asset: f64,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            asset_lifetime: 15.0,
            component_lifetime: None,
            units_per_asset: 1.0,
        }
    }
}

/// Reconciliation Engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Relative tolerance for `sum(segments) ~= total`.
    pub tolerance: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { tolerance: 0.01 }
    }
}

/// Validator thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Absolute year-over-year fractional change that raises a warning.
    pub growth_warning: f64,
    /// Relative tolerance for sum-consistency checks.
    pub sum_tolerance: f64,
    /// Slack allowed on share bounds for floating-point noise.
    pub share_epsilon: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            growth_warning: 0.5,
            sum_tolerance: 0.01,
            share_epsilon: 1e-9,
        }
    }
}

/// Complete configuration for one forecast run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Last forecast year (inclusive).
    pub horizon_end: i32,
    /// Free-form scenario label carried into the output.
    pub scenario: String,
    pub cost: CostConfig,
    pub market: MarketConfig,
    pub adoption: AdoptionConfig,
    pub chimera: ChimeraConfig,
    pub stock: StockConfig,
    pub reconcile: ReconcileConfig,
    pub validation: ValidationConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_end: 2040,
            scenario: "baseline".to_string(),
            cost: CostConfig::default(),
            market: MarketConfig::default(),
            adoption: AdoptionConfig::default(),
            chimera: ChimeraConfig::default(),
            stock: StockConfig::default(),
            reconcile: ReconcileConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

fn finite(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite(field))
    }
}

fn positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
    finite(field, v)?;
    if v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive(field))
    }
}

impl ForecastConfig {
    /// Reject configurations no stage could honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1970..=2200).contains(&self.horizon_end) {
            return Err(ConfigError::OutOfRange {
                field: "horizon_end",
                range: "[1970, 2200]",
            });
        }

        let c = &self.cost;
        if c.smoothing_window == 0 {
            return Err(ConfigError::NonPositive("cost.smoothing_window"));
        }
        finite("cost.min_cagr", c.min_cagr)?;
        finite("cost.max_cagr", c.max_cagr)?;
        if c.min_cagr <= -1.0 {
            return Err(ConfigError::OutOfRange {
                field: "cost.min_cagr",
                range: "(-1, max_cagr]",
            });
        }
        if c.min_cagr > c.max_cagr {
            return Err(ConfigError::InvertedBounds("cost cagr"));
        }

        let m = &self.market;
        finite("market.growth_cap", m.growth_cap)?;
        if !(0.0..1.0).contains(&m.growth_cap) {
            return Err(ConfigError::OutOfRange {
                field: "market.growth_cap",
                range: "[0, 1)",
            });
        }

        let a = &self.adoption;
        positive("adoption.ceiling", a.ceiling)?;
        if a.ceiling > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "adoption.ceiling",
                range: "(0, 1]",
            });
        }
        positive("adoption.k_min", a.k_min)?;
        positive("adoption.k_max", a.k_max)?;
        if a.k_min > a.k_max {
            return Err(ConfigError::InvertedBounds("adoption k"));
        }
        positive("adoption.fallback_k", a.fallback_k)?;
        if !(a.k_min..=a.k_max).contains(&a.fallback_k) {
            return Err(ConfigError::OutOfRange {
                field: "adoption.fallback_k",
                range: "[k_min, k_max]",
            });
        }
        finite("adoption.t0_window", a.t0_window)?;
        if a.t0_window < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "adoption.t0_window",
                range: "[0, inf)",
            });
        }
        finite("adoption.no_tipping_cap", a.no_tipping_cap)?;
        if !(0.0..=1.0).contains(&a.no_tipping_cap) {
            return Err(ConfigError::OutOfRange {
                field: "adoption.no_tipping_cap",
                range: "[0, 1]",
            });
        }
        if a.population < 4 {
            return Err(ConfigError::OutOfRange {
                field: "adoption.population",
                range: "[4, inf)",
            });
        }
        if a.generations == 0 {
            return Err(ConfigError::NonPositive("adoption.generations"));
        }
        if a.trend_window < 2 {
            return Err(ConfigError::OutOfRange {
                field: "adoption.trend_window",
                range: "[2, inf)",
            });
        }
        positive("adoption.convergence_tol", a.convergence_tol)?;

        let ch = &self.chimera;
        finite("chimera.peak_share", ch.peak_share)?;
        if !(0.0..=1.0).contains(&ch.peak_share) {
            return Err(ConfigError::OutOfRange {
                field: "chimera.peak_share",
                range: "[0, 1]",
            });
        }
        positive("chimera.half_life", ch.half_life)?;

        let s = &self.stock;
        positive("stock.asset_lifetime", s.asset_lifetime)?;
        if s.asset_lifetime > MAX_LIFETIME_YEARS {
            return Err(ConfigError::OutOfRange {
                field: "stock.asset_lifetime",
                range: "(0, 200]",
            });
        }
        if let Some(l) = s.component_lifetime {
            positive("stock.component_lifetime", l)?;
            if l > MAX_LIFETIME_YEARS {
                return Err(ConfigError::OutOfRange {
                    field: "stock.component_lifetime",
                    range: "(0, 200]",
                });
            }
        }
        positive("stock.units_per_asset", s.units_per_asset)?;

        positive("reconcile.tolerance", self.reconcile.tolerance)?;

        let v = &self.validation;
        positive("validation.growth_warning", v.growth_warning)?;
        positive("validation.sum_tolerance", v.sum_tolerance)?;
        finite("validation.share_epsilon", v.share_epsilon)?;
        Ok(())
    }
}
