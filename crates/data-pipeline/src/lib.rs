#![deny(warnings)]

//! Input boundary: dataset bundles of region-keyed `{X: [years], Y: [values]}`
//! series, and the mapping from dataset names to forecast inputs.
//!
//! Loading completes before the engine runs. A missing dataset or region is
//! an explicit insufficient-data error, never a zero-filled series.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use demand_core::{SeriesError, TimeSeries};
use demand_runtime::{Allocation, ForecastInputs, ReconciliationInputs, StockBaselines};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while reading datasets.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("malformed dataset bundle: {0}")]
    Json(#[from] serde_json::Error),
    #[error("insufficient data: dataset {0} not in bundle")]
    MissingDataset(String),
    #[error("insufficient data: dataset {dataset} has no region {region}")]
    MissingRegion { dataset: String, region: String },
    #[error("{dataset}/{region}: X and Y differ in length ({x} vs {y})")]
    LengthMismatch {
        dataset: String,
        region: String,
        x: usize,
        y: usize,
    },
    #[error("{dataset}/{region}: year {year} is not a whole number")]
    FractionalYear {
        dataset: String,
        region: String,
        year: f64,
    },
    #[error("{dataset}/{region}: {source}")]
    Series {
        dataset: String,
        region: String,
        #[source]
        source: SeriesError,
    },
}

impl DataError {
    /// True for the missing-dataset and missing-region cases.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            DataError::MissingDataset(_) | DataError::MissingRegion { .. }
        )
    }
}

/// A year as found in source files: `2020` or `2020.0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawYear {
    Int(i32),
    Float(f64),
}

/// One region's series as stored on disk. `null` values are allowed and
/// dropped on conversion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    #[serde(rename = "X")]
    pub x: Vec<RawYear>,
    #[serde(rename = "Y")]
    pub y: Vec<Option<f64>>,
}

impl RawSeries {
    pub fn new(years: &[i32], values: &[f64]) -> Self {
        Self {
            x: years.iter().map(|y| RawYear::Int(*y)).collect(),
            y: values.iter().map(|v| Some(*v)).collect(),
        }
    }

    /// Validate and convert into a sorted [`TimeSeries`].
    pub fn to_series(&self, dataset: &str, region: &str) -> Result<TimeSeries, DataError> {
        if self.x.len() != self.y.len() {
            return Err(DataError::LengthMismatch {
                dataset: dataset.to_string(),
                region: region.to_string(),
                x: self.x.len(),
                y: self.y.len(),
            });
        }
        let mut points = Vec::with_capacity(self.x.len());
        let mut dropped = 0usize;
        for (year, value) in self.x.iter().zip(&self.y) {
            let year = match *year {
                RawYear::Int(y) => y,
                RawYear::Float(f) if f.fract() == 0.0 && f.abs() <= f64::from(i32::MAX) => {
                    f as i32
                }
                RawYear::Float(f) => {
                    return Err(DataError::FractionalYear {
                        dataset: dataset.to_string(),
                        region: region.to_string(),
                        year: f,
                    })
                }
            };
            match value {
                Some(v) if v.is_finite() => points.push((year, *v)),
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(dataset, region, dropped, "skipped missing values");
        }
        points.sort_by_key(|(y, _)| *y);
        let (years, values) = points.into_iter().unzip();
        TimeSeries::new(years, values).map_err(|source| DataError::Series {
            dataset: dataset.to_string(),
            region: region.to_string(),
            source,
        })
    }
}

/// Every dataset in a bundle: dataset name -> region -> series.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetBundle {
    datasets: BTreeMap<String, BTreeMap<String, RawSeries>>,
}

impl DatasetBundle {
    pub fn from_json_str(s: &str) -> Result<Self, DataError> {
        let bundle: Self = serde_json::from_str(s)?;
        bundle.log_loaded();
        Ok(bundle)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, DataError> {
        let bundle: Self = serde_json::from_reader(reader)?;
        bundle.log_loaded();
        Ok(bundle)
    }

    fn log_loaded(&self) {
        debug!(
            datasets = self.datasets.len(),
            series = self.datasets.values().map(BTreeMap::len).sum::<usize>(),
            "dataset bundle loaded"
        );
    }

    pub fn insert(&mut self, dataset: impl Into<String>, region: impl Into<String>, raw: RawSeries) {
        self.datasets
            .entry(dataset.into())
            .or_default()
            .insert(region.into(), raw);
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Regions present in `dataset`.
    pub fn regions(&self, dataset: &str) -> Result<BTreeSet<&str>, DataError> {
        self.datasets
            .get(dataset)
            .map(|r| r.keys().map(String::as_str).collect())
            .ok_or_else(|| DataError::MissingDataset(dataset.to_string()))
    }

    /// Validated series for one dataset and region.
    pub fn series(&self, dataset: &str, region: &str) -> Result<TimeSeries, DataError> {
        let regions = self
            .datasets
            .get(dataset)
            .ok_or_else(|| DataError::MissingDataset(dataset.to_string()))?;
        let raw = regions
            .get(region)
            .ok_or_else(|| DataError::MissingRegion {
                dataset: dataset.to_string(),
                region: region.to_string(),
            })?;
        raw.to_series(dataset, region)
    }

    /// Like [`DatasetBundle::series`] but a missing dataset or region is `None`.
    fn optional_series(
        &self,
        dataset: Option<&str>,
        region: &str,
    ) -> Result<Option<TimeSeries>, DataError> {
        let Some(dataset) = dataset else {
            return Ok(None);
        };
        match self.series(dataset, region) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.is_missing() => {
                debug!(dataset, region, "optional dataset absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Every region mentioned by any required dataset of `mapping`. Regions
    /// missing from some dataset are included so their runs can report it.
    pub fn regions_for(&self, mapping: &DatasetMapping) -> BTreeSet<String> {
        mapping
            .required()
            .into_iter()
            .filter_map(|d| self.datasets.get(d))
            .flat_map(|r| r.keys().cloned())
            .collect()
    }

    /// Assemble engine inputs for one region.
    pub fn inputs_for(
        &self,
        mapping: &DatasetMapping,
        region: &str,
    ) -> Result<ForecastInputs, DataError> {
        let total_sales = self.series(&mapping.total_sales, region)?;
        let chimera_sales = match &mapping.chimera_sales {
            Some(d) => Some(self.series(d, region)?),
            None => None,
        };

        let opening_year = total_sales.first_year();
        let baseline = |dataset: &Option<String>| -> Result<Option<f64>, DataError> {
            let fleet = self.optional_series(dataset.as_deref(), region)?;
            Ok(fleet.zip(opening_year).and_then(|(s, y)| s.get(y)))
        };
        let stock_baselines = StockBaselines {
            disruptor: baseline(&mapping.fleet.disruptor)?,
            chimera: baseline(&mapping.fleet.chimera)?,
            incumbent: baseline(&mapping.fleet.incumbent)?,
        };

        let reconciliation = match &mapping.reconciliation {
            Some(r) => Some(ReconciliationInputs {
                total_history: self.series(&r.total, region)?,
                allocations: r.allocations.clone(),
                residual_segment: r.residual_segment.clone(),
                independent_total: match &r.independent_total {
                    Some(d) => Some(self.series(d, region)?),
                    None => None,
                },
            }),
            None => None,
        };

        Ok(ForecastInputs {
            region: region.to_string(),
            segment: mapping.segment.clone(),
            disruptor_cost: self.series(&mapping.disruptor_cost, region)?,
            incumbent_cost: self.series(&mapping.incumbent_cost, region)?,
            total_sales,
            disruptor_sales: self.series(&mapping.disruptor_sales, region)?,
            chimera_sales,
            stock_baselines,
            reconciliation,
        })
    }
}

/// Optional fleet (installed base) datasets used as opening stock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetDatasets {
    pub disruptor: Option<String>,
    pub chimera: Option<String>,
    pub incumbent: Option<String>,
}

/// Component-level reconciliation datasets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationMapping {
    /// Historical total component demand.
    pub total: String,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub residual_segment: Option<String>,
    #[serde(default)]
    pub independent_total: Option<String>,
}

/// Which dataset plays which role in a forecast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetMapping {
    /// Product segment label carried into the output.
    pub segment: String,
    pub disruptor_cost: String,
    pub incumbent_cost: String,
    pub total_sales: String,
    pub disruptor_sales: String,
    #[serde(default)]
    pub chimera_sales: Option<String>,
    #[serde(default)]
    pub fleet: FleetDatasets,
    #[serde(default)]
    pub reconciliation: Option<ReconciliationMapping>,
}

impl DatasetMapping {
    /// Datasets a region must have to be forecast.
    pub fn required(&self) -> Vec<&str> {
        let mut out = vec![
            self.disruptor_cost.as_str(),
            self.incumbent_cost.as_str(),
            self.total_sales.as_str(),
            self.disruptor_sales.as_str(),
        ];
        out.extend(self.chimera_sales.as_deref());
        if let Some(r) = &self.reconciliation {
            out.push(r.total.as_str());
            out.extend(r.independent_total.as_deref());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BUNDLE: &str = r#"{
        "ev_cost": {
            "USA": {"X": [2019, 2018, 2020], "Y": [30000, 33000, 27000]},
            "China": {"X": [2018.0, 2019.0], "Y": [25000, null]}
        },
        "ice_cost": {"USA": {"X": [2018, 2019, 2020], "Y": [25000, 25000, 25000]}},
        "car_sales": {"USA": {"X": [2018, 2019, 2020], "Y": [1000, 1010, 1020]}},
        "ev_sales": {"USA": {"X": [2018, 2019, 2020], "Y": [10, 20, 40]}},
        "ev_fleet": {"USA": {"X": [2018, 2019], "Y": [55, 60]}}
    }"#;

    fn mapping() -> DatasetMapping {
        serde_json::from_str(
            r#"{
                "segment": "passenger_vehicles",
                "disruptor_cost": "ev_cost",
                "incumbent_cost": "ice_cost",
                "total_sales": "car_sales",
                "disruptor_sales": "ev_sales",
                "fleet": {"disruptor": "ev_fleet", "incumbent": "ice_fleet"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_sorts_and_drops_nulls() {
        let b = DatasetBundle::from_json_str(BUNDLE).unwrap();
        let us = b.series("ev_cost", "USA").unwrap();
        assert_eq!(us.years(), &[2018, 2019, 2020]);
        assert_eq!(us.values(), &[33000.0, 30000.0, 27000.0]);
        let cn = b.series("ev_cost", "China").unwrap();
        assert_eq!(cn.years(), &[2018]);
    }

    #[test]
    fn missing_data_is_explicit() {
        let b = DatasetBundle::from_json_str(BUNDLE).unwrap();
        let e = b.series("ice_cost", "China").unwrap_err();
        assert!(matches!(e, DataError::MissingRegion { ref region, .. } if region == "China"));
        assert!(e.is_missing());
        assert!(matches!(b.series("lead_demand", "USA"), Err(DataError::MissingDataset(_))));
        assert!(b.inputs_for(&mapping(), "China").unwrap_err().is_missing());
    }

    #[test]
    fn malformed_series_are_rejected() {
        let mut b = DatasetBundle::default();
        b.insert("x", "r", RawSeries { x: vec![RawYear::Int(2020)], y: vec![] });
        assert!(matches!(b.series("x", "r"), Err(DataError::LengthMismatch { x: 1, y: 0, .. })));
        b.insert("x", "r", RawSeries::new(&[2020, 2020], &[1.0, 2.0]));
        assert!(matches!(b.series("x", "r"), Err(DataError::Series { .. })));
        b.insert("x", "r", RawSeries { x: vec![RawYear::Float(2020.5)], y: vec![Some(1.0)] });
        assert!(matches!(b.series("x", "r"), Err(DataError::FractionalYear { .. })));
        assert!(matches!(DatasetBundle::from_json_str("[1, 2]"), Err(DataError::Json(_))));
    }

    #[test]
    fn builds_inputs_with_fleet_baselines() {
        let b = DatasetBundle::from_json_str(BUNDLE).unwrap();
        let inputs = b.inputs_for(&mapping(), "USA").unwrap();
        assert_eq!(inputs.region, "USA");
        assert_eq!(inputs.segment, "passenger_vehicles");
        assert_eq!(inputs.total_sales.len(), 3);
        assert_eq!(inputs.stock_baselines.disruptor, Some(55.0));
        assert_eq!(inputs.stock_baselines.incumbent, None);
        assert!(inputs.chimera_sales.is_none());
        assert!(inputs.reconciliation.is_none());
    }

    #[test]
    fn reconciliation_datasets_are_required() {
        let mut b = DatasetBundle::from_json_str(BUNDLE).unwrap();
        let mut m = mapping();
        m.reconciliation = Some(ReconciliationMapping {
            total: "battery_demand".into(),
            allocations: vec![Allocation { name: "grid".into(), share: 0.1 }],
            residual_segment: Some("other".into()),
            independent_total: None,
        });
        assert!(b.inputs_for(&m, "USA").unwrap_err().is_missing());
        b.insert("battery_demand", "USA", RawSeries::new(&[2018, 2019], &[5000.0, 5200.0]));
        let inputs = b.inputs_for(&m, "USA").unwrap();
        let r = inputs.reconciliation.unwrap();
        assert_eq!(r.total_history.len(), 2);
        assert_eq!(r.allocations[0].share, 0.1);
    }

    #[test]
    fn regions_cover_every_required_dataset() {
        let b = DatasetBundle::from_json_str(BUNDLE).unwrap();
        let regions: Vec<String> = b.regions_for(&mapping()).into_iter().collect();
        assert_eq!(regions, vec!["China".to_string(), "USA".to_string()]);
        assert_eq!(b.regions("ice_cost").unwrap().len(), 1);
    }

    proptest! {
        #[test]
        fn any_year_order_converts_sorted(mut years in proptest::collection::btree_set(1990i32..2060, 1..30)
            .prop_map(|s| s.into_iter().collect::<Vec<_>>()).prop_shuffle()) {
            let values: Vec<f64> = years.iter().map(|y| f64::from(*y) * 2.0).collect();
            let raw = RawSeries::new(&years, &values);
            let s = raw.to_series("d", "r").unwrap();
            years.sort_unstable();
            prop_assert_eq!(s.years(), years.as_slice());
            for (y, v) in s.iter() {
                prop_assert_eq!(v, f64::from(y) * 2.0);
            }
        }
    }
}
