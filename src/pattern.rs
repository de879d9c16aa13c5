use crate::beat_detection::{BeatGrid, Subdivision};
use crate::chart::NoteEvent;
use crate::difficulty::{DifficultyModel, CHORD_WEIGHT, JACK_RATING_WINDOW, JACK_WEIGHT};
use crate::style::{PatternKind, StyleMix, StylePolicy};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Feedback gain keeping the running weighted density on target.
const DEFICIT_GAIN: f32 = 0.15;
const DEFAULT_SCALE: f32 = 5.0;

/// The sequencing walk: one decision point per eligible grid slot, all
/// randomness drawn from a single seeded stream.
pub struct PatternGenerator<'a> {
    grid: &'a BeatGrid,
    mix: &'a StyleMix,
    model: &'a DifficultyModel,
    policy: &'a StylePolicy,
    lane_count: u8,
}

/// Per-walk mutable state; owned by one candidate, never shared.
struct WalkState {
    rng: Pcg64,
    /// Start time of the last event in each lane.
    last_start: Vec<f32>,
    /// Release time of the last event in each lane (start for taps).
    last_end: Vec<f32>,
    /// Lane is locked until this time by an in-progress hold.
    hold_until: Vec<f32>,
    /// Lanes of the previous emitted event.
    prev_lanes: Vec<u8>,
    emitted_weight: f32,
    emitted_events: usize,
    emitted_notes: usize,
    emitted_lns: usize,
}

impl<'a> PatternGenerator<'a> {
    pub fn new(
        grid: &'a BeatGrid,
        mix: &'a StyleMix,
        model: &'a DifficultyModel,
        policy: &'a StylePolicy,
        lane_count: u8,
    ) -> Self {
        PatternGenerator {
            grid,
            mix,
            model,
            policy,
            lane_count,
        }
    }

    /// Run the walk for one candidate seed.
    pub fn generate(&self, seed: u64) -> Vec<NoteEvent> {
        let lanes = self.lane_count as usize;
        let mut state = WalkState {
            rng: Pcg64::seed_from_u64(seed),
            last_start: vec![f32::NEG_INFINITY; lanes],
            last_end: vec![f32::NEG_INFINITY; lanes],
            hold_until: vec![f32::NEG_INFINITY; lanes],
            prev_lanes: Vec::new(),
            emitted_weight: 0.0,
            emitted_events: 0,
            emitted_notes: 0,
            emitted_lns: 0,
        };

        let step = self.policy.step.clamp(1, 100);
        let eligible_spacing = self.grid.spacing() * 100.0 / step as f32;
        let scale_factor = (self.policy.scale / DEFAULT_SCALE).max(0.05);

        let mut notes: Vec<NoteEvent> = Vec::new();
        let mut prev_stride = -1i64;

        for (i, slot) in self.grid.slots.iter().enumerate() {
            // `step` thins the decision grid: a slot is eligible only when
            // the stride counter advances.
            let stride = (i as i64 * step as i64) / 100;
            if stride == prev_stride {
                continue;
            }
            prev_stride = stride;

            let t = slot.time;
            let onset_factor = 0.6 + 0.8 * slot.onset.clamp(0.0, 1.0);
            let avg_weight = if state.emitted_events == 0 {
                1.2
            } else {
                (state.emitted_weight / state.emitted_events as f32).max(1.0)
            };
            let base = self.model.target_nps * eligible_spacing * scale_factor / avg_weight;
            let deficit = self.model.target_nps * t - state.emitted_weight;
            let p = (base * onset_factor + (DEFICIT_GAIN * deficit).clamp(-0.4, 0.6))
                .clamp(0.0, 1.0);

            if state.rng.gen::<f32>() >= p {
                continue;
            }

            self.emit(
                slot.time,
                slot.refined_time,
                slot.subdivision,
                deficit,
                &mut state,
                &mut notes,
            );
        }

        log::debug!(
            "walk done: {} notes, weighted {:.1} (target {:.1}) over {:.1}s",
            notes.len(),
            state.emitted_weight,
            self.model.target_nps * self.grid.duration,
            self.grid.duration
        );
        notes
    }

    /// Emit one event (possibly a chord) at a decision point.
    fn emit(
        &self,
        grid_time: f32,
        refined_time: f32,
        subdivision: Subdivision,
        deficit: f32,
        state: &mut WalkState,
        notes: &mut Vec<NoteEvent>,
    ) {
        let kind = self.mix.pick(state.rng.gen::<f32>());

        // Technical favors off-beat slots; on quarters it sometimes declines.
        if kind == Some(PatternKind::Technical)
            && subdivision == Subdivision::Quarter
            && state.rng.gen::<f32>() < 0.35
        {
            return;
        }

        let t = if self.policy.auto_snap {
            grid_time
        } else {
            refined_time
        };

        let lanes = self.select_lanes(kind, t, deficit, state);
        if lanes.is_empty() {
            return;
        }

        let size = lanes.len();
        let mut weight = size as f32 + CHORD_WEIGHT * (size as f32 - 1.0);

        for &lane in &lanes {
            let duration = self.roll_hold(t, state);
            let li = lane as usize;
            if t - state.last_end[li] < JACK_RATING_WINDOW {
                weight += JACK_WEIGHT;
            }
            state.last_start[li] = t;
            state.last_end[li] = t + duration;
            state.hold_until[li] = t + duration;
            notes.push(NoteEvent {
                time: t,
                lane,
                duration,
            });
            state.emitted_notes += 1;
            if duration > 0.0 {
                state.emitted_lns += 1;
            }
        }

        state.prev_lanes = lanes;
        state.emitted_weight += weight;
        state.emitted_events += 1;
    }

    /// Choose the lane set for an event of the drawn pattern kind, honoring
    /// hold locks and the jack-interval constraint (relaxed for the
    /// jack-flavored kinds in proportion to their weight).
    fn select_lanes(
        &self,
        kind: Option<PatternKind>,
        t: f32,
        deficit: f32,
        state: &mut WalkState,
    ) -> Vec<u8> {
        let jack_window = self.policy.jack_interval_ms / 1000.0;
        let free: Vec<u8> = (0..self.lane_count)
            .filter(|&l| state.hold_until[l as usize] <= t)
            .collect();
        if free.is_empty() {
            return Vec::new();
        }
        let unjacked: Vec<u8> = free
            .iter()
            .copied()
            .filter(|&l| t - state.last_start[l as usize] >= jack_window)
            .collect();
        let prev = state.prev_lanes.clone();

        match kind {
            Some(PatternKind::Jackspeed) => {
                let weight = self.bias_weight(PatternKind::Jackspeed);
                let jack_p = 0.5 + 0.5 * weight;
                // Deliberately repeat a previous lane
                let repeats: Vec<u8> = prev.iter().copied().filter(|l| free.contains(l)).collect();
                if !repeats.is_empty() && state.rng.gen::<f32>() < jack_p {
                    let idx = state.rng.gen_range(0..repeats.len());
                    vec![repeats[idx]]
                } else {
                    self.pick_distinct(1, &unjacked, &prev, state)
                }
            }
            Some(PatternKind::Chordjack) => {
                let weight = self.bias_weight(PatternKind::Chordjack);
                let relax_p = 0.35 + 0.65 * weight;
                let size = (2 + state.rng.gen_range(0..2)).min(self.model.max_chord as usize);
                // Jack-constrained lanes re-enter the pool on a weight roll
                let mut pool = unjacked.clone();
                for &l in &free {
                    if !pool.contains(&l) && state.rng.gen::<f32>() < relax_p {
                        pool.push(l);
                    }
                }
                pool.sort_unstable();
                // Prefer re-striking previous lanes so chords actually jack
                self.pick_preferring(size, &pool, &prev, state)
            }
            Some(PatternKind::Jumpstream) => {
                let size = 2.min(self.model.max_chord as usize);
                self.pick_distinct(size, &unjacked, &prev, state)
            }
            Some(PatternKind::Handstream) => {
                let size = 3.min(self.model.max_chord as usize);
                self.pick_distinct(size, &unjacked, &prev, state)
            }
            Some(PatternKind::Technical) => {
                let size = 1 + state.rng.gen_range(0..2).min(self.model.max_chord as usize - 1);
                self.pick_distinct(size, &unjacked, &[], state)
            }
            // Stream, stamina, and the baseline emit single notes avoiding
            // the previous lane; a large density deficit upgrades to a jump
            // so sparse decision grids can still reach the target.
            _ => {
                let size = if deficit > 1.5 {
                    2.min(self.model.max_chord as usize)
                } else {
                    1
                };
                self.pick_distinct(size, &unjacked, &prev, state)
            }
        }
    }

    fn bias_weight(&self, kind: PatternKind) -> f32 {
        self.policy
            .bias(kind)
            .map(|b| b.weight as f32 / 100.0)
            .unwrap_or(0.0)
    }

    /// Pick `size` lanes from `pool`, avoiding `avoid` where possible.
    fn pick_distinct(
        &self,
        size: usize,
        pool: &[u8],
        avoid: &[u8],
        state: &mut WalkState,
    ) -> Vec<u8> {
        let mut preferred: Vec<u8> = pool.iter().copied().filter(|l| !avoid.contains(l)).collect();
        let mut fallback: Vec<u8> = pool.iter().copied().filter(|l| avoid.contains(l)).collect();

        let mut chosen = Vec::with_capacity(size);
        while chosen.len() < size {
            let source = if !preferred.is_empty() {
                &mut preferred
            } else if !fallback.is_empty() {
                &mut fallback
            } else {
                break;
            };
            let idx = state.rng.gen_range(0..source.len());
            chosen.push(source.swap_remove(idx));
        }
        chosen.sort_unstable();
        chosen
    }

    /// Pick `size` lanes preferring members of `prefer` (chordjack re-strikes).
    fn pick_preferring(
        &self,
        size: usize,
        pool: &[u8],
        prefer: &[u8],
        state: &mut WalkState,
    ) -> Vec<u8> {
        let mut preferred: Vec<u8> = pool.iter().copied().filter(|l| prefer.contains(l)).collect();
        let mut rest: Vec<u8> = pool.iter().copied().filter(|l| !prefer.contains(l)).collect();

        let mut chosen = Vec::with_capacity(size);
        while chosen.len() < size {
            let source = if !preferred.is_empty() {
                &mut preferred
            } else if !rest.is_empty() {
                &mut rest
            } else {
                break;
            };
            let idx = state.rng.gen_range(0..source.len());
            chosen.push(source.swap_remove(idx));
        }
        chosen.sort_unstable();
        chosen
    }

    /// Decide a hold duration: 1-4 subdivisions, clamped to track end.
    fn roll_hold(&self, t: f32, state: &mut WalkState) -> f32 {
        if !self.mix.allow_long_notes {
            return 0.0;
        }
        if state.rng.gen::<f32>() >= self.mix.ln_rate {
            return 0.0;
        }
        if let Some(cap) = self.policy.map_type.ln_fraction_cap() {
            // Admitting this hold must keep the realized fraction under cap
            let projected =
                (state.emitted_lns + 1) as f32 / (state.emitted_notes + 1) as f32;
            if projected >= cap {
                return 0.0;
            }
        }
        let subdivisions = state.rng.gen_range(1..=4) as f32;
        let duration = subdivisions * self.grid.spacing();
        // The last hold must release at or before track end
        duration.min((self.grid.duration - t).max(0.0))
    }
}
