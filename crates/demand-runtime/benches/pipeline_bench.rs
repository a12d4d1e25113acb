use criterion::{black_box, criterion_group, criterion_main, Criterion};
use demand_core::{ForecastConfig, TimeSeries};
use demand_runtime::{Engine, ForecastInputs, StockBaselines};

fn bench_pipeline(c: &mut Criterion) {
    let total = |y: i32| 80_000.0 * 1.01f64.powi(y - 2010);
    let inputs = ForecastInputs {
        region: "Global".into(),
        segment: "commercial_vehicles".into(),
        disruptor_cost: TimeSeries::from_fn(2010, 2024, |y| 300_000.0 * 0.91f64.powi(y - 2010)),
        incumbent_cost: TimeSeries::from_fn(2010, 2024, |_| 120_000.0),
        total_sales: TimeSeries::from_fn(2010, 2024, total),
        disruptor_sales: TimeSeries::from_fn(2010, 2024, |y| {
            total(y) * 0.002 * 1.4f64.powi(y - 2010)
        }),
        chimera_sales: Some(TimeSeries::from_fn(2010, 2024, |y| total(y) * 0.03)),
        stock_baselines: StockBaselines::default(),
        reconciliation: None,
    };
    let mut cfg = ForecastConfig::default();
    cfg.horizon_end = 2050;
    cfg.stock.component_lifetime = Some(7.0);
    let engine = match Engine::new(cfg) {
        Ok(e) => e,
        Err(e) => panic!("bench config rejected: {e}"),
    };
    c.bench_function("full pipeline 2010-2050", |b| {
        b.iter(|| black_box(engine.run(&inputs)))
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
