//! The forecast engine and its multi-region batch runner.

use std::collections::BTreeMap;

use demand_adoption::{chimera_hump, historical_shares, ChimeraCurve};
use demand_core::{
    Confidence, DemandKind, ForecastConfig, ForecastRow, ForecastTable, IssueKind, TimeSeries,
    ValidationIssue, MIN_USABLE_POINTS,
};
use demand_econ::{detect_tipping_point, forecast_market, CostForecast, MarketForecast};
use demand_reconcile::{reconcile, ReconciliationResult, SegmentSpec};
use demand_stock::{component_demand, ComponentDemand, InstalledBaseLedger, Opening};
use demand_validate::Validator;
use tracing::{debug, info, warn};

use crate::inputs::{ForecastInputs, ForecastOutput, ReconciliationInputs};
use crate::strategy::{
    AdoptionModel, ConstantLifetime, CostModel, LogisticAdoption, StockFlowModel, WrightsLawCost,
};
use crate::EngineError;

/// A configured forecast engine. Holds no run state, so one engine can serve
/// any number of regions.
#[derive(Clone, Debug, Default)]
pub struct Engine<C = WrightsLawCost, A = LogisticAdoption, S = ConstantLifetime> {
    config: ForecastConfig,
    cost: C,
    adoption: A,
    stock: S,
}

impl Engine {
    /// Engine with the default strategies.
    ///
    /// Example:
    /// let engine = Engine::new(ForecastConfig::default())?;
    /// let output = engine.run(&inputs)?;
    pub fn new(config: ForecastConfig) -> Result<Self, EngineError> {
        Self::with_strategies(config, WrightsLawCost, LogisticAdoption, ConstantLifetime)
    }
}

impl<C: CostModel, A: AdoptionModel, S: StockFlowModel> Engine<C, A, S> {
    pub fn with_strategies(
        config: ForecastConfig,
        cost: C,
        adoption: A,
        stock: S,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            cost,
            adoption,
            stock,
        })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Run every stage for one region.
    pub fn run(&self, inputs: &ForecastInputs) -> Result<ForecastOutput, EngineError> {
        let cfg = &self.config;
        let horizon = cfg.horizon_end;
        if inputs.last_observed_year().is_some_and(|y| y > horizon) {
            warn!(region = %inputs.region, horizon, "observations after horizon_end ignored");
        }
        let inputs = &inputs.up_to(horizon);
        let region = inputs.region.as_str();
        require(region, "disruptor_cost", &inputs.disruptor_cost, MIN_USABLE_POINTS)?;
        require(region, "incumbent_cost", &inputs.incumbent_cost, MIN_USABLE_POINTS)?;
        require(region, "total_sales", &inputs.total_sales, MIN_USABLE_POINTS)?;
        require(region, "disruptor_sales", &inputs.disruptor_sales, 1)?;

        let mut issues = Vec::new();

        let disruptor_cost = self.cost.extend(&inputs.disruptor_cost, horizon, &cfg.cost)?;
        let incumbent_cost = self.cost.extend(&inputs.incumbent_cost, horizon, &cfg.cost)?;
        for (label, curve) in [
            ("disruptor cost", &disruptor_cost),
            ("incumbent cost", &incumbent_cost),
        ] {
            if curve.cagr_clamped() {
                issues.push(
                    ValidationIssue::warning(
                        IssueKind::CagrClamped,
                        label,
                        format!(
                            "fitted CAGR {:.4} clamped to {:.4}",
                            curve.fitted_cagr, curve.applied_cagr
                        ),
                    )
                    .magnitude(curve.fitted_cagr),
                );
            }
        }
        let tipping = detect_tipping_point(&disruptor_cost, &incumbent_cost)?;

        let market = forecast_market(&inputs.total_sales, horizon, &cfg.market)?;
        issues.extend(growth_clamp_issue("market", &market));

        let shares = historical_shares(&inputs.disruptor_sales, &inputs.total_sales);
        if shares.is_empty() {
            return Err(insufficient(region, "disruptor_sales"));
        }
        let adoption = self
            .adoption
            .fit(&shares, tipping.year, horizon, &cfg.adoption)?;
        issues.extend(adoption.issues.iter().cloned());

        let chimera = match &inputs.chimera_sales {
            Some(sales) => {
                let shares = historical_shares(sales, &inputs.total_sales);
                if shares.is_empty() {
                    return Err(insufficient(region, "chimera_sales"));
                }
                Some(chimera_hump(
                    &shares,
                    tipping.year,
                    horizon,
                    &cfg.chimera,
                    cfg.adoption.trend_window,
                )?)
            }
            None => None,
        };

        let mut table = build_table(
            &market,
            &adoption.shares,
            chimera.as_ref(),
            &disruptor_cost,
            &incumbent_cost,
        )?;
        let ledgers = self.build_ledgers(inputs, &mut table, chimera.is_some())?;

        let units = cfg.stock.units_per_asset;
        let components = cfg
            .stock
            .component_lifetime
            .map(|lifetime| {
                ledgers
                    .iter()
                    .map(|l| component_demand(l, lifetime, units))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        if let Some(replacement) = components
            .as_deref()
            .and_then(|c| sum_series(c.iter().map(|d| d.replacement.clone())))
        {
            for row in table.rows_mut() {
                row.replacement_demand = replacement.get(row.year);
            }
        }

        let reconciliation = match &inputs.reconciliation {
            Some(recon) => Some(self.reconcile_components(
                region,
                recon,
                &ledgers,
                components.as_deref(),
                &mut issues,
            )?),
            None => None,
        };

        let mut validator = Validator::new(&cfg.validation);
        validator.record(issues).table(&table, cfg.adoption.ceiling);
        for ledger in &ledgers {
            validator.ledger(ledger);
        }
        if let Some(result) = &reconciliation {
            validator.reconciliation(result);
        }
        let report = validator.finish();

        info!(
            region,
            scenario = %cfg.scenario,
            tipping = ?tipping.year,
            method = ?adoption.method,
            passed = report.passed,
            issues = report.issues.len(),
            "forecast complete"
        );

        Ok(ForecastOutput {
            region: inputs.region.clone(),
            segment: inputs.segment.clone(),
            scenario: cfg.scenario.clone(),
            horizon_end: horizon,
            tipping,
            adoption_method: adoption.method,
            logistic: adoption.params,
            chimera,
            disruptor_cost,
            incumbent_cost,
            market,
            table,
            ledgers,
            reconciliation,
            report,
        })
    }

    /// Run each region independently. A failing region is reported in its
    /// slot and never stops the others.
    pub fn run_regions<'a>(
        &self,
        inputs: impl IntoIterator<Item = &'a ForecastInputs>,
    ) -> BTreeMap<String, Result<ForecastOutput, EngineError>> {
        inputs
            .into_iter()
            .map(|i| {
                let result = self.run(i);
                if let Err(e) = &result {
                    warn!(region = %i.region, error = %e, "region not forecast");
                }
                (i.region.clone(), result)
            })
            .collect()
    }

    /// One ledger per powertrain, fed with that powertrain's demand, and the
    /// opening stocks written back into the table.
    fn build_ledgers(
        &self,
        inputs: &ForecastInputs,
        table: &mut ForecastTable,
        with_chimera: bool,
    ) -> Result<Vec<InstalledBaseLedger>, EngineError> {
        let lifetime = self.stock.lifetime(&self.config.stock);
        let historical_years = table.rows().iter().filter(|r| r.historical).count();
        let baselines = &inputs.stock_baselines;
        let build = |powertrain: &str, adds: TimeSeries, baseline: Option<f64>| {
            let opening = match baseline {
                Some(b) => Opening::Baseline(b),
                None => Opening::WarmUp { historical_years },
            };
            InstalledBaseLedger::build(&inputs.segment, powertrain, &adds, opening, &lifetime)
        };

        let disruptor = build(
            "disruptor",
            table.column(|r| r.disruptor_demand),
            baselines.disruptor,
        )?;
        let chimera = if with_chimera {
            Some(build(
                "chimera",
                table.column(|r| r.chimera_demand),
                baselines.chimera,
            )?)
        } else {
            None
        };
        let incumbent = build(
            "incumbent",
            table.column(|r| r.incumbent_demand),
            baselines.incumbent,
        )?;

        for row in table.rows_mut() {
            row.disruptor_stock = disruptor.stock_at(row.year);
            row.chimera_stock = chimera.as_ref().and_then(|l| l.stock_at(row.year));
            row.incumbent_stock = incumbent.stock_at(row.year);
        }
        Ok([Some(disruptor), chimera, Some(incumbent)]
            .into_iter()
            .flatten()
            .collect())
    }

    /// Balance OEM and replacement component demand against a component
    /// total, filling the gap with allocated and residual segments.
    fn reconcile_components(
        &self,
        region: &str,
        recon: &ReconciliationInputs,
        ledgers: &[InstalledBaseLedger],
        components: Option<&[ComponentDemand]>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Result<ReconciliationResult, EngineError> {
        let cfg = &self.config;
        require(region, "component_total", &recon.total_history, MIN_USABLE_POINTS)?;
        let total = forecast_market(&recon.total_history, cfg.horizon_end, &cfg.market)?;
        issues.extend(growth_clamp_issue("component total", &total));

        let (oem, replacement) = match components {
            Some(c) => (
                sum_series(c.iter().map(|d| d.oem.clone())),
                sum_series(c.iter().map(|d| d.replacement.clone())),
            ),
            None => {
                let units = cfg.stock.units_per_asset;
                (sum_series(ledgers.iter().map(|l| l.adds.map(|_, a| a * units))), None)
            }
        };
        let oem = oem.ok_or_else(|| insufficient(region, "oem demand"))?;
        let (first, last) = match (oem.first_year(), oem.last_year()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(insufficient(region, "oem demand")),
        };
        let total = total.series.between(first, last);
        if total.is_empty() {
            return Err(insufficient(region, "component_total"));
        }

        let mut segments = vec![SegmentSpec::bottom_up(
            "oem",
            DemandKind::Oem,
            oem,
            Confidence::HighBottomUp,
        )];
        if let Some(r) = replacement {
            segments.push(SegmentSpec::bottom_up(
                "replacement",
                DemandKind::Replacement,
                r,
                Confidence::MediumBottomUp,
            ));
        }
        segments.extend(
            recon.allocations
                .iter()
                .map(|a| SegmentSpec::allocated(a.name.clone(), a.share)),
        );
        if let Some(name) = &recon.residual_segment {
            segments.push(SegmentSpec::residual(name.clone()));
        }
        debug!(region, segments = segments.len(), years = total.len(), "reconciling components");
        Ok(reconcile(
            &total,
            &segments,
            recon.independent_total.as_ref(),
            &cfg.reconcile,
        )?)
    }
}

fn insufficient(region: &str, dataset: &str) -> EngineError {
    EngineError::InsufficientData {
        dataset: dataset.to_string(),
        region: region.to_string(),
    }
}

fn require(
    region: &str,
    dataset: &str,
    series: &TimeSeries,
    needed: usize,
) -> Result<(), EngineError> {
    if series.len() < needed {
        return Err(insufficient(region, dataset));
    }
    Ok(())
}

fn growth_clamp_issue(segment: &str, market: &MarketForecast) -> Option<ValidationIssue> {
    (market.applied_cagr != market.implied_cagr).then(|| {
        ValidationIssue::warning(
            IssueKind::GrowthClamped,
            segment,
            format!(
                "implied growth {:.4} clamped to {:.4}",
                market.implied_cagr, market.applied_cagr
            ),
        )
        .magnitude(market.implied_cagr)
    })
}

/// Year-wise sum over series sharing the first series' year axis.
fn sum_series(parts: impl IntoIterator<Item = TimeSeries>) -> Option<TimeSeries> {
    let mut parts = parts.into_iter();
    let first = parts.next()?;
    Some(parts.fold(first, |acc, p| {
        acc.map(|year, v| v + p.get(year).unwrap_or(0.0))
    }))
}

/// Market demand split by powertrain. Chimera share is trimmed first when
/// it would push the disruptor and chimera past the whole market; the
/// incumbent takes the rest.
fn build_table(
    market: &MarketForecast,
    disruptor: &TimeSeries,
    chimera: Option<&ChimeraCurve>,
    disruptor_cost: &CostForecast,
    incumbent_cost: &CostForecast,
) -> Result<ForecastTable, EngineError> {
    let mut table = ForecastTable::new();
    for (year, total) in market.series.iter() {
        let d_share = disruptor.interpolate(year).unwrap_or(0.0);
        let mut c_share = chimera
            .and_then(|c| c.shares.interpolate(year))
            .unwrap_or(0.0);
        if d_share + c_share > 1.0 {
            debug!(year, d_share, c_share, "chimera share trimmed");
            c_share = (1.0 - d_share).max(0.0);
        }
        let i_share = 1.0 - d_share - c_share;
        table.push(ForecastRow {
            year,
            historical: year <= market.last_historical_year,
            market_demand: total,
            disruptor_demand: total * d_share,
            chimera_demand: total * c_share,
            incumbent_demand: total * i_share,
            disruptor_share: d_share,
            chimera_share: c_share,
            incumbent_share: i_share,
            disruptor_cost: disruptor_cost.series.get(year),
            incumbent_cost: incumbent_cost.series.get(year),
            ..Default::default()
        })?;
    }
    Ok(table)
}
