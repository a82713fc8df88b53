use sparse_td::config::RunConfig;
use sparse_td::error::{Error, Result};
use sparse_td::observer::CoderAdapter;
use sparse_td::prng::{Prng, RandomSource};
use sparse_td::sparse_coder::SparseCoder;
use tracing::info;

use crate::env_tracking::out_line;

const GRID: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternReport {
    pub steps: usize,
    pub early_error: f32,
    pub late_error: f32,
    pub mean_active_units: f32,
}

/// Write one random horizontal or vertical bar (sometimes two) onto the grid.
fn draw_bars(rng: &mut Prng, input: &mut [f32]) {
    input.fill(0.0);
    let count = if rng.uniform(0.0, 1.0) < 0.3 { 2 } else { 1 };
    for _ in 0..count {
        let line = rng.gen_range_usize(0, GRID);
        let horizontal = rng.uniform(0.0, 1.0) < 0.5;
        for k in 0..GRID {
            let idx = if horizontal {
                line * GRID + k
            } else {
                k * GRID + line
            };
            input[idx] = 1.0;
        }
    }
}

/// Train the sparse coder on bar patterns and report how its error and
/// activity settle.
pub fn run_pattern_demo(run: &RunConfig) -> Result<PatternReport> {
    let cfg = &run.coder;
    if cfg.num_visible != GRID * GRID {
        return Err(Error::DimensionMismatch {
            what: "bar grid visible units",
            expected: GRID * GRID,
            actual: cfg.num_visible,
        });
    }

    let mut rng = Prng::new(run.seed);
    let mut coder = SparseCoder::create_random(cfg.num_visible, cfg.num_hidden, &mut rng)?
        .with_execution_tier(cfg.tier);
    let mut patterns = Prng::new(run.seed.wrapping_add(1));
    let mut input = vec![0.0f32; cfg.num_visible];

    info!(
        num_visible = cfg.num_visible,
        num_hidden = cfg.num_hidden,
        tier = ?coder.effective_execution_tier(),
        "sparse-demo start"
    );
    let _ = out_line(format_args!(
        "sparse-demo: {}x{} bars, visible={}, hidden={}, steps={}",
        GRID, GRID, cfg.num_visible, cfg.num_hidden, run.steps
    ));

    let window = (run.steps / 10).max(1);
    let mut early_sum = 0.0f32;
    let mut late_sum = 0.0f32;
    let mut active_sum = 0usize;

    for t in 0..run.steps {
        draw_bars(&mut patterns, &mut input);
        let error = coder.step(&input, &cfg.rates)?;

        let snap = CoderAdapter::new(&coder).snapshot();
        active_sum += snap.active_units;
        if t < window {
            early_sum += error;
        }
        if t + window >= run.steps {
            late_sum += error;
        }

        if run.report_every > 0 && (t + 1).is_multiple_of(run.report_every) {
            info!(
                step = t + 1,
                error = snap.reconstruction_error,
                active = snap.active_units,
                mean_bias = snap.mean_bias,
                "coder snapshot"
            );
            if out_line(format_args!(
                "step={} error={:.4} active_units={} mean_state={:.4} mean_lateral={:+.4}",
                t + 1,
                snap.reconstruction_error,
                snap.active_units,
                snap.mean_state,
                snap.mean_lateral_weight
            ))
            .is_err()
            {
                break;
            }
        }
    }

    let samples = window.min(run.steps).max(1) as f32;
    let report = PatternReport {
        steps: run.steps,
        early_error: early_sum / samples,
        late_error: late_sum / samples,
        mean_active_units: active_sum as f32 / run.steps.max(1) as f32,
    };
    let _ = out_line(format_args!(
        "sparse-demo done: early_error={:.4} late_error={:.4} mean_active_units={:.2}",
        report.early_error, report.late_error, report.mean_active_units
    ));
    if let Ok(json) = serde_json::to_string(&CoderAdapter::new(&coder).snapshot()) {
        let _ = out_line(format_args!("  final_snapshot={json}"));
    }
    Ok(report)
}
