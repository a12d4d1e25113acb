//! Rise-then-decay share curve for transitional (chimera) technologies.

use demand_core::{ChimeraConfig, TimeSeries};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logistic::extend_linear;
use crate::AdoptionError;

/// Chimera share history plus its hump-shaped forecast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChimeraCurve {
    /// Clipped history followed by forecast shares in `[0, 1]`.
    pub shares: TimeSeries,
    /// Share at the tipping year. When tipping already happened this is the
    /// value implied by decaying backwards from the last observation.
    pub peak_share: f64,
    pub peak_year: Option<i32>,
    pub half_life: f64,
}

impl ChimeraCurve {
    /// Decay-phase share for a year after the peak.
    pub fn decay_at(&self, year: i32) -> Option<f64> {
        let peak_year = self.peak_year?;
        let dt = f64::from(year - peak_year);
        Some(self.peak_share * 0.5f64.powf(dt / self.half_life))
    }
}

/// Model a bridge technology that rises until the tipping year, then decays
/// with half-life `cfg.half_life`.
///
/// Rising phase runs linearly from the last observation to `peak_share` at
/// the tipping year, so rising and decay meet at the peak. Without a tipping
/// year the recent trend continues, capped at the peak share.
pub fn chimera_hump(
    history: &TimeSeries,
    tipping_year: Option<i32>,
    horizon_end: i32,
    cfg: &ChimeraConfig,
    trend_window: usize,
) -> Result<ChimeraCurve, AdoptionError> {
    let hist = history.map(|_, s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 });
    let (last_year, last_share) = hist.last().ok_or(AdoptionError::InsufficientData)?;

    let Some(tip) = tipping_year else {
        let cap = cfg.peak_share.max(last_share);
        let forecast = extend_linear(&hist, horizon_end, trend_window, 0.0, cap);
        return Ok(ChimeraCurve {
            shares: hist.concat(&forecast)?,
            peak_share: cap,
            peak_year: None,
            half_life: cfg.half_life,
        });
    };

    let peak_share = if tip > last_year {
        cfg.peak_share
    } else {
        // Anchor the decay on the last observation so the curve stays continuous.
        last_share * 2f64.powf(f64::from(last_year - tip) / cfg.half_life)
    };
    let curve = ChimeraCurve {
        shares: TimeSeries::default(),
        peak_share,
        peak_year: Some(tip),
        half_life: cfg.half_life,
    };

    let span = f64::from(tip - last_year);
    let forecast = TimeSeries::from_fn(last_year + 1, horizon_end, |y| {
        let s = if y <= tip {
            last_share + (peak_share - last_share) * f64::from(y - last_year) / span
        } else {
            curve.decay_at(y).unwrap_or(0.0)
        };
        s.clamp(0.0, 1.0)
    });
    debug!(tip, peak_share, half_life = cfg.half_life, "chimera hump built");

    Ok(ChimeraCurve {
        shares: hist.concat(&forecast)?,
        ..curve
    })
}
