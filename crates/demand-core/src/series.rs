//! Annual time series with validated year axis.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of points for a series to be usable by any fitter.
pub const MIN_USABLE_POINTS: usize = 2;

/// Errors raised when building or combining time series.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    /// Year and value vectors must have the same length.
    #[error("years and values differ in length ({years} vs {values})")]
    LengthMismatch { years: usize, values: usize },
    /// Years must be strictly increasing with no duplicates.
    #[error("years must be strictly increasing (saw {prev} then {next})")]
    NotIncreasing { prev: i32, next: i32 },
    /// A value is NaN or infinite.
    #[error("non-finite value at year {0}")]
    NonFinite(i32),
    /// Too few points for the requested operation.
    #[error("need at least {needed} points, got {got}")]
    TooShort { needed: usize, got: usize },
    /// Two series share no common year range.
    #[error("series do not overlap")]
    NoOverlap,
}

/// Ordered sequence of `(year, value)` pairs with strictly increasing years.
///
/// Values are not required to be finite: downstream stages (e.g. the
/// installed-base ledger) must be able to carry a broken value through to the
/// validator instead of hiding it. Use [`TimeSeries::require_finite`] at input
/// boundaries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesParts")]
pub struct TimeSeries {
    years: Vec<i32>,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct SeriesParts {
    years: Vec<i32>,
    values: Vec<f64>,
}

impl TryFrom<SeriesParts> for TimeSeries {
    type Error = SeriesError;

    fn try_from(p: SeriesParts) -> Result<Self, Self::Error> {
        TimeSeries::new(p.years, p.values)
    }
}

impl TimeSeries {
    /// Build a series, checking lengths and year ordering.
    ///
    /// Example:
    /// let s = TimeSeries::new(vec![2020, 2021], vec![1.0, 2.0]).unwrap();
    /// assert_eq!(s.len(), 2);
    pub fn new(years: Vec<i32>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if years.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                years: years.len(),
                values: values.len(),
            });
        }
        for w in years.windows(2) {
            if w[1] <= w[0] {
                return Err(SeriesError::NotIncreasing {
                    prev: w[0],
                    next: w[1],
                });
            }
        }
        Ok(Self { years, values })
    }

    /// Caller guarantees `years` is strictly increasing and lengths match.
    pub(crate) fn from_sorted(years: Vec<i32>, values: Vec<f64>) -> Self {
        debug_assert_eq!(years.len(), values.len());
        Self { years, values }
    }

    /// Build a series by evaluating `f` on every year in `start..=end`.
    pub fn from_fn(start: i32, end: i32, mut f: impl FnMut(i32) -> f64) -> Self {
        let years: Vec<i32> = (start..=end).collect();
        let values = years.iter().map(|&y| f(y)).collect();
        Self { years, values }
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first_year(&self) -> Option<i32> {
        self.years.first().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    /// Last `(year, value)` pair, if any.
    pub fn last(&self) -> Option<(i32, f64)> {
        Some((*self.years.last()?, *self.values.last()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.years.iter().copied().zip(self.values.iter().copied())
    }

    /// Exact lookup of the value recorded for `year`.
    pub fn get(&self, year: i32) -> Option<f64> {
        self.years
            .binary_search(&year)
            .ok()
            .map(|i| self.values[i])
    }

    /// Value at `year`, linearly interpolated between neighbouring points.
    /// Returns `None` outside the covered range.
    pub fn interpolate(&self, year: i32) -> Option<f64> {
        match self.years.binary_search(&year) {
            Ok(i) => Some(self.values[i]),
            Err(i) => {
                if i == 0 || i >= self.years.len() {
                    return None;
                }
                let (y0, y1) = (self.years[i - 1], self.years[i]);
                let (v0, v1) = (self.values[i - 1], self.values[i]);
                let frac = f64::from(year - y0) / f64::from(y1 - y0);
                Some(v0 + (v1 - v0) * frac)
            }
        }
    }

    /// Resample onto every integer year in `start..=end` by interpolation.
    pub fn resample(&self, start: i32, end: i32) -> Result<Self, SeriesError> {
        if start > end {
            return Err(SeriesError::NoOverlap);
        }
        let mut values = Vec::with_capacity((end - start + 1) as usize);
        for y in start..=end {
            values.push(self.interpolate(y).ok_or(SeriesError::NoOverlap)?);
        }
        Ok(Self {
            years: (start..=end).collect(),
            values,
        })
    }

    /// Inclusive year range covered by both series.
    pub fn overlap(&self, other: &TimeSeries) -> Option<(i32, i32)> {
        let start = self.first_year()?.max(other.first_year()?);
        let end = self.last_year()?.min(other.last_year()?);
        (start <= end).then_some((start, end))
    }

    /// Sub-series restricted to years in `from..=to`.
    pub fn between(&self, from: i32, to: i32) -> Self {
        let (years, values) = self.iter().filter(|(y, _)| (from..=to).contains(y)).unzip();
        Self { years, values }
    }

    /// Apply `f` to every value, keeping the year axis.
    pub fn map(&self, mut f: impl FnMut(i32, f64) -> f64) -> Self {
        Self {
            years: self.years.clone(),
            values: self.iter().map(|(y, v)| f(y, v)).collect(),
        }
    }

    /// Append one point; `year` must be after the current last year.
    pub fn push(&mut self, year: i32, value: f64) -> Result<(), SeriesError> {
        if let Some(prev) = self.last_year() {
            if year <= prev {
                return Err(SeriesError::NotIncreasing { prev, next: year });
            }
        }
        self.years.push(year);
        self.values.push(value);
        Ok(())
    }

    /// Concatenate `tail` after `self`; `tail` must start after `self` ends.
    pub fn concat(&self, tail: &TimeSeries) -> Result<Self, SeriesError> {
        let mut out = self.clone();
        for (y, v) in tail.iter() {
            out.push(y, v)?;
        }
        Ok(out)
    }

    /// Fail unless the series has at least `needed` points.
    pub fn require_len(&self, needed: usize) -> Result<(), SeriesError> {
        if self.len() < needed {
            return Err(SeriesError::TooShort {
                needed,
                got: self.len(),
            });
        }
        Ok(())
    }

    /// Fail on the first NaN or infinite value.
    pub fn require_finite(&self) -> Result<(), SeriesError> {
        match self.iter().find(|(_, v)| !v.is_finite()) {
            Some((y, _)) => Err(SeriesError::NonFinite(y)),
            None => Ok(()),
        }
    }

    /// Year-over-year fractional change, keyed by the later year.
    /// Pairs with a zero or non-finite base are skipped.
    pub fn growth_rates(&self) -> Vec<(i32, f64)> {
        self.years
            .windows(2)
            .zip(self.values.windows(2))
            .filter(|(_, v)| v[0] != 0.0 && v[0].is_finite() && v[1].is_finite())
            .map(|(y, v)| (y[1], v[1] / v[0] - 1.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn series(pairs: &[(i32, f64)]) -> TimeSeries {
        let (y, v) = pairs.iter().copied().unzip();
        TimeSeries::new(y, v).unwrap()
    }

    #[test]
    fn rejects_duplicate_years() {
        let err = TimeSeries::new(vec![2020, 2020], vec![1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            SeriesError::NotIncreasing {
                prev: 2020,
                next: 2020
            }
        );
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(matches!(
            TimeSeries::new(vec![2020], vec![1.0, 2.0]),
            Err(SeriesError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn interpolates_gaps() {
        let s = series(&[(2020, 10.0), (2024, 30.0)]);
        assert_eq!(s.interpolate(2022), Some(20.0));
        assert_eq!(s.interpolate(2019), None);
        let r = s.resample(2020, 2024).unwrap();
        assert_eq!(r.years(), &[2020, 2021, 2022, 2023, 2024]);
        assert_eq!(r.get(2021), Some(15.0));
    }

    #[test]
    fn overlap_and_between() {
        let a = series(&[(2018, 1.0), (2019, 1.0), (2020, 1.0)]);
        let b = series(&[(2019, 2.0), (2021, 2.0)]);
        assert_eq!(a.overlap(&b), Some((2019, 2020)));
        assert_eq!(a.between(2019, 2030).years(), &[2019, 2020]);
        let c = series(&[(2030, 1.0)]);
        assert_eq!(a.overlap(&c), None);
    }

    #[test]
    fn concat_requires_later_tail() {
        let a = series(&[(2020, 1.0), (2021, 2.0)]);
        let b = series(&[(2022, 3.0)]);
        assert_eq!(a.concat(&b).unwrap().len(), 3);
        assert!(b.concat(&a).is_err());
    }

    #[test]
    fn serde_validates_on_read() {
        let ok: TimeSeries = serde_json::from_str(r#"{"years":[1,2],"values":[0.5,0.6]}"#).unwrap();
        assert_eq!(ok.get(2), Some(0.6));
        let bad = serde_json::from_str::<TimeSeries>(r#"{"years":[2,1],"values":[0.5,0.6]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn growth_skips_zero_base() {
        let s = series(&[(2020, 0.0), (2021, 10.0), (2022, 11.0)]);
        let g = s.growth_rates();
        assert_eq!(g.len(), 1);
        assert_eq!(g[0].0, 2022);
        assert!((g[0].1 - 0.1).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn interpolation_stays_between_neighbours(a in -1e6f64..1e6, b in -1e6f64..1e6, gap in 2i32..20) {
            let s = series(&[(2000, a), (2000 + gap, b)]);
            for y in 2000..=2000 + gap {
                let v = s.interpolate(y).unwrap();
                prop_assert!(v >= a.min(b) - 1e-6 && v <= a.max(b) + 1e-6);
            }
        }
    }
}
