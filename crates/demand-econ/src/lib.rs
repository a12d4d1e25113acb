#![deny(warnings)]

//! Cost and market models for disruption forecasting.
//!
//! This crate provides validated utilities for:
//! - Smoothing and extrapolating cost curves (Wright's-Law style decline)
//! - Detecting the first year a disruptor reaches cost parity
//! - Forecasting total addressable demand with a robust, capped trend

use demand_core::stats::{median, ols, theil_sen, LinearFit};
use demand_core::{
    CostConfig, MarketConfig, SeriesError, TimeSeries, TippingConfidence, TippingPoint,
    MIN_USABLE_POINTS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced by cost and market models.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Input series failed structural validation.
    #[error(transparent)]
    Series(#[from] SeriesError),
    /// Costs must be strictly positive to be fitted in log space.
    #[error("cost at year {0} is not strictly positive")]
    NonPositiveCost(i32),
    /// Regression could not be fitted (e.g. all points on one year).
    #[error("trend could not be fitted")]
    DegenerateFit,
    /// Observed demand totals cannot be negative.
    #[error("demand at year {0} is negative")]
    NegativeDemand(i32),
}

/// A smoothed historical cost curve extended to the horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostForecast {
    /// Smoothed history followed by extrapolated values.
    pub series: TimeSeries,
    /// Last observed year used, never later than the horizon.
    pub last_historical_year: i32,
    /// CAGR fitted on the (smoothed) history.
    pub fitted_cagr: f64,
    /// CAGR used for extrapolation after clamping.
    pub applied_cagr: f64,
    /// Whether the rolling median changed the history before fitting.
    pub smoothed: bool,
}

impl CostForecast {
    /// True when the fitted CAGR fell outside the configured bounds.
    pub fn cagr_clamped(&self) -> bool {
        self.fitted_cagr != self.applied_cagr
    }
}

/// Centered rolling median. Near the edges the window shrinks symmetrically,
/// so the first and last points keep their raw values. Even widths are
/// rounded down to the next odd width.
///
/// Example:
/// let s = TimeSeries::new(vec![1, 2, 3], vec![1.0, 9.0, 1.0]).unwrap();
/// assert_eq!(rolling_median(&s, 3).get(2), Some(1.0));
pub fn rolling_median(series: &TimeSeries, window: usize) -> TimeSeries {
    let half = window.saturating_sub(1) / 2;
    if half == 0 {
        return series.clone();
    }
    let values = series.values();
    let n = values.len();
    let mut i = 0;
    series.map(|_, raw| {
        let h = half.min(i).min(n - 1 - i);
        let smoothed = median(&values[i - h..=i + h]).unwrap_or(raw);
        i += 1;
        smoothed
    })
}

/// Compound annual growth rate fitted by OLS of `ln(value)` against year.
pub fn fit_log_cagr(series: &TimeSeries) -> Result<f64, EconError> {
    series.require_len(MIN_USABLE_POINTS)?;
    let mut xs = Vec::with_capacity(series.len());
    let mut ys = Vec::with_capacity(series.len());
    for (year, v) in series.iter() {
        if !(v > 0.0 && v.is_finite()) {
            return Err(EconError::NonPositiveCost(year));
        }
        xs.push(f64::from(year));
        ys.push(v.ln());
    }
    let fit = ols(&xs, &ys).ok_or(EconError::DegenerateFit)?;
    Ok(fit.slope.exp() - 1.0)
}

/// Smooth a historical cost series and extrapolate it to `horizon_end`.
///
/// Observations after `horizon_end` are ignored. Fewer than three points, or
/// a window below three, skips smoothing. The fitted CAGR is clamped to
/// `[min_cagr, max_cagr]` before extrapolating from the last smoothed point.
pub fn forecast_cost_curve(
    history: &TimeSeries,
    horizon_end: i32,
    cfg: &CostConfig,
) -> Result<CostForecast, EconError> {
    let history = &history.between(i32::MIN, horizon_end);
    history.require_len(MIN_USABLE_POINTS)?;
    history.require_finite()?;
    if let Some((year, _)) = history.iter().find(|(_, v)| *v <= 0.0) {
        return Err(EconError::NonPositiveCost(year));
    }

    let smoothed = history.len() >= 3 && cfg.smoothing_window >= 3;
    let base = if smoothed {
        rolling_median(history, cfg.smoothing_window)
    } else {
        history.clone()
    };

    let fitted_cagr = fit_log_cagr(&base)?;
    let applied_cagr = fitted_cagr.clamp(cfg.min_cagr, cfg.max_cagr);
    if applied_cagr != fitted_cagr {
        warn!(
            fitted = fitted_cagr,
            applied = applied_cagr,
            "cost CAGR outside configured bounds; clamped"
        );
    }

    let (last_year, last_value) = base.last().ok_or(SeriesError::TooShort {
        needed: MIN_USABLE_POINTS,
        got: 0,
    })?;
    let log_step = (1.0 + applied_cagr).ln();
    let log_last = last_value.ln();
    let mut series = base;
    for year in (last_year + 1)..=horizon_end {
        let v = (log_last + log_step * f64::from(year - last_year)).exp();
        series.push(year, v)?;
    }
    debug!(
        last_year,
        horizon_end, fitted_cagr, applied_cagr, smoothed, "cost curve extended"
    );

    Ok(CostForecast {
        series,
        last_historical_year: last_year,
        fitted_cagr,
        applied_cagr,
        smoothed,
    })
}

/// First year on the common integer-year grid where the disruptor is at or
/// below the incumbent. `None` if the curves never cross.
pub fn first_parity_year(
    disruptor: &TimeSeries,
    incumbent: &TimeSeries,
) -> Result<Option<i32>, EconError> {
    let (start, end) = disruptor
        .overlap(incumbent)
        .ok_or(SeriesError::NoOverlap)?;
    let d = disruptor.resample(start, end)?;
    let i = incumbent.resample(start, end)?;
    let year = d
        .iter()
        .zip(i.values())
        .find(|((_, dv), iv)| dv <= *iv)
        .map(|((year, _), _)| year);
    Ok(year)
}

/// Detect the tipping point between two extended cost curves.
pub fn detect_tipping_point(
    disruptor: &CostForecast,
    incumbent: &CostForecast,
) -> Result<TippingPoint, EconError> {
    let year = first_parity_year(&disruptor.series, &incumbent.series)?;
    let first_common = disruptor
        .series
        .overlap(&incumbent.series)
        .map(|(s, _)| s)
        .ok_or(SeriesError::NoOverlap)?;
    let observed_until = disruptor
        .last_historical_year
        .min(incumbent.last_historical_year);
    let confidence = match year {
        None => TippingConfidence::NotReached,
        Some(y) if y == first_common => TippingConfidence::AlreadyAchieved,
        Some(y) if y <= observed_until => TippingConfidence::Historical,
        Some(_) => TippingConfidence::Projected,
    };
    debug!(?year, ?confidence, "tipping point detected");
    Ok(TippingPoint {
        year,
        disruptor_cagr: disruptor.applied_cagr,
        incumbent_cagr: incumbent.applied_cagr,
        confidence,
    })
}

/// Total-demand history extended with a capped robust trend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketForecast {
    /// History followed by forecast values.
    pub series: TimeSeries,
    /// Last observed year used, never later than the horizon.
    pub last_historical_year: i32,
    /// Theil-Sen trend against `year - first_year`.
    pub trend: LinearFit,
    /// Annual growth the trend implies between the last observation and the horizon.
    pub implied_cagr: f64,
    /// `implied_cagr` after the growth cap.
    pub applied_cagr: f64,
}

/// Forecast total demand to `horizon_end`.
///
/// Fits a Theil-Sen trend, converts the trend's growth over the forecast
/// window into an implied CAGR, clamps it to `+/-growth_cap`, and compounds
/// from the last observed value. Observations after `horizon_end` are
/// ignored; negative observations are rejected.
pub fn forecast_market(
    history: &TimeSeries,
    horizon_end: i32,
    cfg: &MarketConfig,
) -> Result<MarketForecast, EconError> {
    let history = &history.between(i32::MIN, horizon_end);
    history.require_len(MIN_USABLE_POINTS)?;
    history.require_finite()?;
    if let Some((year, _)) = history.iter().find(|(_, v)| *v < 0.0) {
        return Err(EconError::NegativeDemand(year));
    }
    let first = history.first_year().ok_or(EconError::DegenerateFit)?;
    let (last_year, last_value) = history.last().ok_or(EconError::DegenerateFit)?;

    let xs: Vec<f64> = history.years().iter().map(|&y| f64::from(y - first)).collect();
    let trend = theil_sen(&xs, history.values()).ok_or(EconError::DegenerateFit)?;

    let steps = horizon_end - last_year;
    let implied_cagr = if steps <= 0 {
        0.0
    } else {
        let from = trend.at(f64::from(last_year - first));
        let to = trend.at(f64::from(horizon_end - first));
        if from > 0.0 && to > 0.0 {
            (to / from).powf(1.0 / f64::from(steps)) - 1.0
        } else if to <= 0.0 {
            -1.0
        } else {
            f64::INFINITY
        }
    };
    let cap = cfg.growth_cap;
    let applied_cagr = implied_cagr.clamp(-cap, cap);
    if applied_cagr != implied_cagr {
        warn!(
            implied = implied_cagr,
            applied = applied_cagr,
            "market growth clamped to cap"
        );
    }

    let mut series = history.clone();
    for year in (last_year + 1)..=horizon_end {
        let v = last_value * (1.0 + applied_cagr).powi(year - last_year);
        series.push(year, v.max(0.0))?;
    }

    Ok(MarketForecast {
        series,
        last_historical_year: last_year,
        trend,
        implied_cagr,
        applied_cagr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn series(start: i32, values: &[f64]) -> TimeSeries {
        let years = (start..start + values.len() as i32).collect();
        TimeSeries::new(years, values.to_vec()).unwrap()
    }

    #[test]
    fn rolling_median_suppresses_spike() {
        let s = series(2015, &[10.0, 9.0, 30.0, 7.0, 6.0]);
        let m = rolling_median(&s, 3);
        assert_eq!(m.get(2017), Some(9.0));
        assert_eq!(m.get(2016), Some(10.0));
        assert_eq!(m.get(2015), Some(10.0));
        assert_eq!(m.get(2019), Some(6.0));
    }

    #[test]
    fn recovers_exponential_decline() {
        let s = TimeSeries::from_fn(2010, 2020, |y| 1000.0 * 0.9f64.powi(y - 2010));
        let cagr = fit_log_cagr(&s).unwrap();
        assert!((cagr + 0.1).abs() < 1e-9);
        let f = forecast_cost_curve(&s, 2030, &CostConfig::default()).unwrap();
        assert_eq!(f.series.last_year(), Some(2030));
        let expected = 1000.0 * 0.9f64.powi(20);
        assert!((f.series.get(2030).unwrap() - expected).abs() / expected < 1e-6);
        assert!(!f.cagr_clamped());
    }

    #[test]
    fn two_points_skip_smoothing() {
        let s = series(2020, &[100.0, 80.0]);
        let f = forecast_cost_curve(&s, 2022, &CostConfig::default()).unwrap();
        assert!(!f.smoothed);
        assert!((f.applied_cagr + 0.2).abs() < 1e-12);
        // Extrapolated from the last point, 2021 = 80.
        assert!((f.series.get(2022).unwrap() - 64.0).abs() < 1e-9);
    }

    #[test]
    fn window_below_three_does_not_smooth() {
        let s = series(2020, &[100.0, 300.0, 80.0, 70.0]);
        let cfg = CostConfig {
            smoothing_window: 2,
            ..CostConfig::default()
        };
        let f = forecast_cost_curve(&s, 2025, &cfg).unwrap();
        assert!(!f.smoothed);
        assert_eq!(f.series.get(2021), Some(300.0));
        assert!(forecast_cost_curve(&s, 2025, &CostConfig::default()).unwrap().smoothed);
    }

    #[test]
    fn history_past_horizon_is_ignored() {
        let cfg = CostConfig::default();
        let ev = TimeSeries::from_fn(2010, 2024, |y| 3000.0 * 0.85f64.powi(y - 2010));
        let ice = TimeSeries::from_fn(2010, 2024, |_| 1000.0);
        let ev = forecast_cost_curve(&ev, 2014, &cfg).unwrap();
        let ice = forecast_cost_curve(&ice, 2014, &cfg).unwrap();
        assert_eq!(ev.series.years(), &[2010, 2011, 2012, 2013, 2014]);
        assert_eq!(ev.last_historical_year, 2014);
        // Parity lands in 2017 on the full data, after this horizon.
        let tp = detect_tipping_point(&ev, &ice).unwrap();
        assert_eq!(tp.year, None);

        let m = forecast_market(&ice.series, 2012, &MarketConfig::default()).unwrap();
        assert_eq!(m.series.last_year(), Some(2012));
        assert_eq!(m.last_historical_year, 2012);
        assert_eq!(
            forecast_cost_curve(&series(2020, &[5.0, 4.0]), 2020, &cfg),
            Err(EconError::Series(SeriesError::TooShort { needed: 2, got: 1 }))
        );
    }

    #[test]
    fn runaway_cagr_is_clamped() {
        let s = series(2020, &[1.0, 3.0, 9.0, 27.0]);
        let f = forecast_cost_curve(&s, 2025, &CostConfig::default()).unwrap();
        assert!(f.cagr_clamped());
        assert_eq!(f.applied_cagr, 1.0);
        let last = f.series.get(2023).unwrap();
        assert!((f.series.get(2025).unwrap() - last * 4.0).abs() < 1e-6);
    }

    #[test]
    fn non_positive_cost_rejected() {
        let s = series(2020, &[10.0, 0.0, 5.0]);
        assert_eq!(
            forecast_cost_curve(&s, 2025, &CostConfig::default()),
            Err(EconError::NonPositiveCost(2021))
        );
    }

    #[test]
    fn already_cheaper_tips_in_first_year() {
        let ev = series(2020, &[1200.0, 1104.0]);
        let ice = series(2020, &[1500.0, 1500.0]);
        let cfg = CostConfig::default();
        let ev = forecast_cost_curve(&ev, 2035, &cfg).unwrap();
        let ice = forecast_cost_curve(&ice, 2035, &cfg).unwrap();
        let tp = detect_tipping_point(&ev, &ice).unwrap();
        assert_eq!(tp.year, Some(2020));
        assert_eq!(tp.confidence, TippingConfidence::AlreadyAchieved);
        assert!((tp.disruptor_cagr + 0.08).abs() < 1e-9);
        assert!(tp.incumbent_cagr.abs() < 1e-12);
    }

    #[test]
    fn never_tipping_is_none() {
        let cfg = CostConfig::default();
        let ev = forecast_cost_curve(&series(2020, &[2000.0, 2000.0]), 2100, &cfg).unwrap();
        let ice = forecast_cost_curve(&series(2020, &[1500.0, 1500.0]), 2100, &cfg).unwrap();
        let tp = detect_tipping_point(&ev, &ice).unwrap();
        assert_eq!(tp.year, None);
        assert_eq!(tp.confidence, TippingConfidence::NotReached);
    }

    #[test]
    fn projected_crossing() {
        let cfg = CostConfig::default();
        let ev = forecast_cost_curve(&series(2018, &[300.0, 270.0, 243.0]), 2040, &cfg).unwrap();
        let ice = forecast_cost_curve(&series(2018, &[150.0, 150.0, 150.0]), 2040, &cfg).unwrap();
        let tp = detect_tipping_point(&ev, &ice).unwrap();
        // 243 * 0.9^n <= 150 first holds for n = 5
        assert_eq!(tp.year, Some(2025));
        assert_eq!(tp.confidence, TippingConfidence::Projected);
    }

    #[test]
    fn curves_are_aligned_before_scanning() {
        let d = TimeSeries::new(vec![2020, 2024], vec![200.0, 100.0]).unwrap();
        let i = TimeSeries::new(vec![2019, 2021, 2023, 2025], vec![150.0; 4]).unwrap();
        // Interpolated disruptor: 200, 175, 150 at 2020..2022
        assert_eq!(first_parity_year(&d, &i).unwrap(), Some(2022));
        let far = TimeSeries::new(vec![2030, 2031], vec![1.0, 1.0]).unwrap();
        assert!(first_parity_year(&d, &far).is_err());
    }

    #[test]
    fn market_growth_is_capped() {
        let s = TimeSeries::from_fn(2015, 2024, |y| 100.0 * 1.2f64.powi(y - 2015));
        let m = forecast_market(&s, 2030, &MarketConfig::default()).unwrap();
        assert!(m.implied_cagr > 0.05);
        assert_eq!(m.applied_cagr, 0.05);
        let last = s.get(2024).unwrap();
        assert!((m.series.get(2026).unwrap() - last * 1.05 * 1.05).abs() < 1e-6);
    }

    #[test]
    fn market_trend_resists_outlier() {
        let s = series(2015, &[100.0, 101.0, 102.0, 500.0, 104.0, 105.0]);
        let m = forecast_market(&s, 2025, &MarketConfig::default()).unwrap();
        assert!((m.trend.slope - 1.0).abs() < 1e-9);
        assert!(m.applied_cagr > 0.0 && m.applied_cagr < 0.01);
    }

    #[test]
    fn negative_totals_are_rejected() {
        let s = series(2018, &[100.0, -5.0, 20.0]);
        assert_eq!(
            forecast_market(&s, 2030, &MarketConfig::default()),
            Err(EconError::NegativeDemand(2019))
        );
    }

    #[test]
    fn collapsing_market_stays_non_negative() {
        let s = series(2018, &[100.0, 60.0, 20.0]);
        let m = forecast_market(&s, 2040, &MarketConfig::default()).unwrap();
        assert_eq!(m.applied_cagr, -0.05);
        assert!(m.series.values().iter().all(|v| *v >= 0.0));
    }

    proptest! {
        #[test]
        fn tipping_is_unique_and_minimal(c0 in 500.0f64..5000.0, rate in 0.01f64..0.3, flat in 100.0f64..3000.0) {
            let d = TimeSeries::from_fn(2020, 2060, |y| c0 * (1.0 - rate).powi(y - 2020));
            let i = TimeSeries::from_fn(2020, 2060, |_| flat);
            if let Some(tip) = first_parity_year(&d, &i).unwrap() {
                for y in 2020..tip {
                    prop_assert!(d.get(y).unwrap() > flat);
                }
                for y in tip..=2060 {
                    prop_assert!(d.get(y).unwrap() <= flat);
                }
            } else {
                prop_assert!(d.get(2060).unwrap() > flat);
            }
        }

        #[test]
        fn market_forecast_respects_cap(vals in proptest::collection::vec(0.0f64..1e6, 3..12)) {
            let s = series(2000, &vals);
            let cfg = MarketConfig::default();
            let m = forecast_market(&s, 2030, &cfg).unwrap();
            prop_assert!(m.series.values().iter().all(|v| *v >= 0.0));
            prop_assert!(m.applied_cagr.abs() <= cfg.growth_cap + 1e-12);
        }
    }
}
