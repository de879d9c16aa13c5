use crate::beat_detection::BeatGrid;
use crate::chart::Chart;
use crate::difficulty::DifficultyModel;
use crate::error::{GenError, Result};
use crate::packager::{ChartPackage, PackageFormat};
use crate::pattern::PatternGenerator;
use crate::progress::{CancelToken, ProgressSink};
use crate::style::{StyleMix, StylePolicy};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Retry-seed perturbation mixed into the candidate seed per attempt.
const SEED_PERTURB: u64 = 0x9E37_79B9_7F4A_7C15;
/// Out-of-tolerance candidates beyond this multiple are rejected outright.
const HARD_CAP: f32 = 3.0;

/// Everything a candidate generation needs, shared read-only across workers.
pub struct CandidateContext<'a> {
    pub grid: &'a BeatGrid,
    pub mix: &'a StyleMix,
    pub model: &'a DifficultyModel,
    pub policy: &'a StylePolicy,
    pub title: &'a str,
    pub artist: &'a str,
    pub lane_count: u8,
    pub tolerance: f32,
    pub max_attempts: u32,
    pub output_dir: &'a Path,
    pub format: PackageFormat,
}

/// One accepted and packaged candidate.
#[derive(Debug)]
pub struct PackagedChart {
    pub path: PathBuf,
    pub chart: Chart,
}

/// The outcome of one request: packaged candidates in request order plus
/// per-candidate failure annotations.
#[derive(Debug)]
pub struct ChartBundle {
    pub base_seed: u64,
    pub charts: Vec<PackagedChart>,
    pub failures: Vec<(usize, GenError)>,
}

impl ChartBundle {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Forwards only monotonically increasing fractions to the sink, so
/// concurrent workers cannot deliver progress out of order.
struct ProgressGate<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<f32>,
}

impl ProgressGate<'_> {
    fn report(&self, fraction: f32) {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(_) => return, // progress is best-effort
        };
        if fraction > *last {
            *last = fraction;
            self.sink.report(fraction);
        }
    }
}

/// Generate, validate, and package `count` candidates.
///
/// Candidates run in parallel over shared read-only inputs; each owns its
/// RNG stream and lane state. Per-candidate failures are isolated: the
/// request fails only when no candidate succeeded.
pub fn generate_bundle(
    ctx: &CandidateContext<'_>,
    base_seed: u64,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<ChartBundle> {
    let count = ctx.policy.count.max(1);
    let completed = AtomicUsize::new(0);
    let gate = ProgressGate {
        sink: progress,
        last: Mutex::new(-1.0),
    };
    gate.report(0.0);

    let results: Vec<Result<PackagedChart>> = (0..count)
        .into_par_iter()
        .map(|index| {
            if cancel.is_cancelled() {
                return Err(GenError::Cancelled);
            }
            let candidate_seed = base_seed.wrapping_add(index as u64);
            let outcome = run_candidate(ctx, index, candidate_seed);
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            gate.report(done as f32 / count as f32);
            outcome
        })
        .collect();

    let mut charts = Vec::new();
    let mut failures = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(packaged) => charts.push(packaged),
            Err(e) => {
                log::warn!("candidate {index} failed: {e}");
                failures.push((index, e));
            }
        }
    }

    if charts.is_empty() {
        // Whole-request failure: surface the first candidate error
        return Err(failures
            .into_iter()
            .next()
            .map(|(_, e)| e)
            .unwrap_or(GenError::Cancelled));
    }

    Ok(ChartBundle {
        base_seed,
        charts,
        failures,
    })
}

/// Generate one candidate with bounded regeneration, keeping the best
/// attempt by rating error.
fn run_candidate(ctx: &CandidateContext<'_>, index: usize, candidate_seed: u64) -> Result<PackagedChart> {
    let generator = PatternGenerator::new(ctx.grid, ctx.mix, ctx.model, ctx.policy, ctx.lane_count);
    let target = ctx.policy.star_rating;

    let mut best: Option<(f32, Chart)> = None;
    let mut last_reject: Option<&'static str> = None;

    for attempt in 0..ctx.max_attempts.max(1) {
        let seed = candidate_seed.wrapping_add((attempt as u64).wrapping_mul(SEED_PERTURB));
        let notes = generator.generate(seed);
        let rating = ctx.model.rate(&notes, ctx.grid.duration, ctx.lane_count);

        let chart = Chart {
            title: ctx.title.to_string(),
            artist: ctx.artist.to_string(),
            lane_count: ctx.lane_count,
            bpm: ctx.grid.bpm,
            seed,
            star_rating: rating,
            style_summary: ctx.policy.summary(),
            quality_shortfall: None,
            notes,
        };

        let snapped_ok = !ctx.policy.auto_snap
            || chart
                .notes
                .iter()
                .all(|n| (ctx.grid.snap(n.time) - n.time).abs() < 1e-6);
        let ln_ok = ctx
            .policy
            .map_type
            .ln_fraction_cap()
            .map(|cap| chart.long_note_fraction() < cap)
            .unwrap_or(true);
        let reject = if chart.has_lane_overlap() {
            Some("same-lane overlap")
        } else if chart.starved_lane().is_some() {
            Some("starved lane")
        } else if !snapped_ok {
            Some("off-grid timestamp")
        } else if !ln_ok {
            Some("long-note fraction above preset cap")
        } else {
            None
        };
        if let Some(reason) = reject {
            log::debug!("candidate {index} attempt {attempt}: rejected ({reason}), retrying");
            last_reject = Some(reason);
            continue;
        }

        let error = (rating - target).abs();
        if error <= ctx.tolerance {
            return package(ctx, index, chart);
        }

        log::debug!(
            "candidate {index} attempt {attempt}: rating {rating:.2} outside ±{:.2} of {target:.2}",
            ctx.tolerance
        );
        if best.as_ref().map(|(e, _)| error < *e).unwrap_or(true) {
            best = Some((error, chart));
        }
    }

    match best {
        Some((error, mut chart)) if error <= HARD_CAP * ctx.tolerance => {
            // Graceful degradation: keep the closest chart, annotated
            chart.quality_shortfall = Some(error);
            package(ctx, index, chart)
        }
        Some((_, chart)) => Err(GenError::DifficultyUnreachable {
            requested: target,
            achieved: chart.star_rating,
        }),
        None => Err(GenError::PatternInvalid {
            reason: last_reject.unwrap_or("no attempt produced a chart").to_string(),
        }),
    }
}

fn package(ctx: &CandidateContext<'_>, index: usize, chart: Chart) -> Result<PackagedChart> {
    let path = ChartPackage::new(&chart).save(ctx.output_dir, index, ctx.format)?;
    Ok(PackagedChart { path, chart })
}
