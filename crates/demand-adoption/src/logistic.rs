//! Logistic S-curve fitting for disruptor market share.

use demand_core::stats::ols;
use demand_core::{
    AdoptionConfig, AdoptionMethod, IssueKind, LogisticParams, TimeSeries, ValidationIssue,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::optimizer::{differential_evolution, DeSettings};
use crate::AdoptionError;

/// Disruptor share history plus forecast to the horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdoptionCurve {
    /// Logistic parameters; `None` on the no-tipping linear path.
    pub params: Option<LogisticParams>,
    pub method: AdoptionMethod,
    /// Clipped history followed by forecast shares, all within `[0, L]`.
    pub shares: TimeSeries,
    pub last_historical_year: i32,
    /// Sum of squared errors of the fitted curve against its observations.
    pub fit_error: Option<f64>,
    /// Degradations encountered while fitting.
    pub issues: Vec<ValidationIssue>,
}

/// Disruptor share per year, clipped to `[0, 1]`.
///
/// Years where total sales are missing, zero, or non-finite are skipped
/// rather than recorded as zero share.
pub fn historical_shares(disruptor: &TimeSeries, total: &TimeSeries) -> TimeSeries {
    let (years, values): (Vec<i32>, Vec<f64>) = total
        .iter()
        .filter(|(_, t)| t.is_finite() && *t > 0.0)
        .filter_map(|(year, t)| {
            let d = disruptor.get(year)?;
            d.is_finite().then(|| (year, (d / t).clamp(0.0, 1.0)))
        })
        .unzip();
    // Filtering an ordered series keeps the year axis strictly increasing.
    TimeSeries::new(years, values).unwrap_or_default()
}

/// Linear continuation of the most recent `window` points for every year in
/// `last+1..=until`, clipped to `[lo, hi]`. A single point extends flat.
pub fn extend_linear(
    history: &TimeSeries,
    until: i32,
    window: usize,
    lo: f64,
    hi: f64,
) -> TimeSeries {
    let Some((last_year, last_value)) = history.last() else {
        return TimeSeries::default();
    };
    let tail: Vec<(i32, f64)> = history
        .iter()
        .skip(history.len().saturating_sub(window))
        .collect();
    let xs: Vec<f64> = tail.iter().map(|(y, _)| f64::from(*y - last_year)).collect();
    let ys: Vec<f64> = tail.iter().map(|(_, v)| *v).collect();
    let slope = ols(&xs, &ys).map_or(0.0, |f| f.slope);
    TimeSeries::from_fn(last_year + 1, until, |y| {
        (last_value + slope * f64::from(y - last_year)).clamp(lo, hi)
    })
}

fn sse(params: &LogisticParams, obs: &TimeSeries) -> f64 {
    obs.iter()
        .map(|(y, s)| {
            let e = params.share(f64::from(y)) - s;
            e * e
        })
        .sum()
}

/// Fit the disruptor adoption curve and project it to `horizon_end`.
///
/// - No tipping year: slow linear trend, non-decreasing, capped at
///   `no_tipping_cap * L`.
/// - Tipping year ahead of the data: history is extended linearly up to the
///   year before tipping; the logistic applies from the tipping year on.
/// - Fewer than `min_fit_points` historical shares, or an optimizer that
///   does not converge: seeded `k = fallback_k`, `t0 = tipping_year`.
pub fn fit_adoption(
    history: &TimeSeries,
    tipping_year: Option<i32>,
    horizon_end: i32,
    cfg: &AdoptionConfig,
) -> Result<AdoptionCurve, AdoptionError> {
    let ceiling = cfg.ceiling;
    let hist = history.map(|_, s| if s.is_finite() { s.clamp(0.0, ceiling) } else { 0.0 });
    let (last_year, last_share) = hist.last().ok_or(AdoptionError::InsufficientData)?;
    let mut issues = Vec::new();

    let Some(tip) = tipping_year else {
        let cap = (cfg.no_tipping_cap * ceiling).max(last_share);
        let rising = extend_linear(&hist, horizon_end, cfg.trend_window, last_share, cap);
        issues.push(ValidationIssue::warning(
            IssueKind::NoTippingPoint,
            "adoption",
            format!("no cost parity through {horizon_end}; linear trend capped at {cap:.4}"),
        ));
        return Ok(AdoptionCurve {
            params: None,
            method: AdoptionMethod::LinearNoTipping,
            shares: hist.concat(&rising)?,
            last_historical_year: last_year,
            fit_error: None,
            issues,
        });
    };

    let pre_tipping = extend_linear(&hist, tip - 1, cfg.trend_window, 0.0, ceiling);
    let observations = hist.concat(&pre_tipping)?;
    let heuristic = LogisticParams {
        ceiling,
        k: cfg.fallback_k,
        t0: f64::from(tip),
    };

    let (params, method) = if hist.len() < cfg.min_fit_points {
        issues.push(
            ValidationIssue::warning(
                IssueKind::FitFallback,
                "adoption",
                format!(
                    "only {} historical share points; using seeded k={} t0={tip}",
                    hist.len(),
                    cfg.fallback_k
                ),
            )
            .magnitude(hist.len() as f64),
        );
        warn!(points = hist.len(), tip, "sparse share history; heuristic logistic");
        (heuristic, AdoptionMethod::HeuristicFallback)
    } else {
        let settings = DeSettings {
            population: cfg.population,
            generations: cfg.generations,
            seed: cfg.seed,
            tol: cfg.convergence_tol,
            ..DeSettings::default()
        };
        let t0 = f64::from(tip);
        let bounds = [
            (cfg.k_min, cfg.k_max),
            (t0 - cfg.t0_window, t0 + cfg.t0_window),
        ];
        let opt = differential_evolution(
            |x| {
                let p = LogisticParams {
                    ceiling,
                    k: x[0],
                    t0: x[1],
                };
                sse(&p, &observations)
            },
            &bounds,
            &settings,
        );
        if opt.converged {
            debug!(k = opt.x[0], t0 = opt.x[1], sse = opt.cost, generations = opt.generations, "logistic fit converged");
            (
                LogisticParams {
                    ceiling,
                    k: opt.x[0],
                    t0: opt.x[1],
                },
                AdoptionMethod::Logistic,
            )
        } else {
            issues.push(
                ValidationIssue::warning(
                    IssueKind::FitFallback,
                    "adoption",
                    format!(
                        "optimizer did not converge in {} generations; using seeded k={} t0={tip}",
                        opt.generations, cfg.fallback_k
                    ),
                )
                .magnitude(opt.cost),
            );
            warn!(generations = opt.generations, "logistic fit did not converge; heuristic logistic");
            (heuristic, AdoptionMethod::HeuristicFallback)
        }
    };

    let forecast = TimeSeries::from_fn(last_year + 1, horizon_end, |y| {
        if y < tip {
            pre_tipping.get(y).unwrap_or(last_share)
        } else {
            params.share(f64::from(y))
        }
    });

    Ok(AdoptionCurve {
        params: Some(params),
        method,
        shares: hist.concat(&forecast)?,
        last_historical_year: last_year,
        fit_error: Some(sse(&params, &observations)),
        issues,
    })
}
