//! Seeded differential evolution (DE/rand/1/bin) over a bounded box.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Relative gap under which two objective values count as a tie.
const TIE_EPS: f64 = 1e-12;

/// Search budget and control parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct DeSettings {
    pub population: usize,
    pub generations: usize,
    /// Differential weight `F`.
    pub mutation: f64,
    /// Crossover probability `CR`.
    pub crossover: f64,
    pub seed: u64,
    /// Converged once the std-dev of population costs is below
    /// `tol * (1 + |mean cost|)`.
    pub tol: f64,
}

impl Default for DeSettings {
    fn default() -> Self {
        Self {
            population: 30,
            generations: 400,
            mutation: 0.7,
            crossover: 0.9,
            seed: 42,
            tol: 1e-8,
        }
    }
}

/// Best point found and how the search ended.
#[derive(Clone, Debug, PartialEq)]
pub struct Optimum {
    pub x: Vec<f64>,
    pub cost: f64,
    pub generations: usize,
    pub converged: bool,
}

/// `a` beats `b` on cost; ties go to the lexicographically smaller point.
fn better(a_cost: f64, a: &[f64], b_cost: f64, b: &[f64]) -> bool {
    let scale = 1.0 + a_cost.abs().max(b_cost.abs());
    if (a_cost - b_cost).abs() <= TIE_EPS * scale {
        return a.iter().zip(b).find(|(x, y)| x != y).map_or(false, |(x, y)| x < y);
    }
    a_cost < b_cost
}

fn evaluate(objective: &impl Fn(&[f64]) -> f64, x: &[f64]) -> f64 {
    let c = objective(x);
    if c.is_finite() {
        c
    } else {
        f64::INFINITY
    }
}

fn spread(costs: &[f64]) -> (f64, f64) {
    let n = costs.len() as f64;
    let mean = costs.iter().sum::<f64>() / n;
    let var = costs.iter().map(|c| (c - mean) * (c - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Minimize `objective` inside `bounds` (one `(lo, hi)` per dimension).
///
/// The search is fully determined by `settings.seed`. A population that never
/// settles within `generations` is reported with `converged = false`; the
/// best point seen is still returned.
pub fn differential_evolution(
    objective: impl Fn(&[f64]) -> f64,
    bounds: &[(f64, f64)],
    settings: &DeSettings,
) -> Optimum {
    let dim = bounds.len();
    let np = settings.population.max(4);
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);

    let mut pop: Vec<Vec<f64>> = (0..np)
        .map(|_| {
            bounds
                .iter()
                .map(|&(lo, hi)| if hi > lo { rng.gen_range(lo..=hi) } else { lo })
                .collect()
        })
        .collect();
    let mut costs: Vec<f64> = pop.iter().map(|x| evaluate(&objective, x)).collect();

    let mut converged = false;
    let mut generations = 0;
    let mut trial = vec![0.0; dim];
    while generations < settings.generations {
        generations += 1;
        for i in 0..np {
            let mut pick = || loop {
                let j = rng.gen_range(0..np);
                if j != i {
                    break j;
                }
            };
            let a = pick();
            let b = loop {
                let j = pick();
                if j != a {
                    break j;
                }
            };
            let c = loop {
                let j = pick();
                if j != a && j != b {
                    break j;
                }
            };
            let forced = rng.gen_range(0..dim.max(1));
            for (d, &(lo, hi)) in bounds.iter().enumerate() {
                trial[d] = if d == forced || rng.gen::<f64>() < settings.crossover {
                    let v = pop[a][d] + settings.mutation * (pop[b][d] - pop[c][d]);
                    v.clamp(lo, hi)
                } else {
                    pop[i][d]
                };
            }
            let cost = evaluate(&objective, &trial);
            if cost <= costs[i] {
                pop[i].copy_from_slice(&trial);
                costs[i] = cost;
            }
        }
        if costs.iter().all(|c| c.is_finite()) {
            let (mean, sd) = spread(&costs);
            if sd <= settings.tol * (1.0 + mean.abs()) {
                converged = true;
                break;
            }
        }
    }

    let mut best = 0;
    for i in 1..np {
        if better(costs[i], &pop[i], costs[best], &pop[best]) {
            best = i;
        }
    }
    Optimum {
        x: pop[best].clone(),
        cost: costs[best],
        generations,
        converged: converged && costs[best].is_finite(),
    }
}
