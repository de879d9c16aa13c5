use crate::beat_detection::BeatGrid;
use crate::chart::NoteEvent;
use crate::error::{GenError, Result};
use crate::style::{StyleMix, StylePolicy};

/// Weighted-density slope of the star-rating curve.
const NPS_BASE: f32 = 0.55;
const NPS_PER_STAR: f32 = 0.85;

/// Extra weight per chord member beyond the first.
pub const CHORD_WEIGHT: f32 = 0.25;
/// Extra weight for a note jacked onto its lane.
pub const JACK_WEIGHT: f32 = 0.15;
/// Same-lane gap under which a note counts as jacked, for rating purposes.
pub const JACK_RATING_WINDOW: f32 = 0.150;

/// Quantitative targets derived from the requested star rating and style.
#[derive(Clone, Debug)]
pub struct DifficultyModel {
    /// Target weighted notes per second.
    pub target_nps: f32,
    /// Maximum simultaneous lanes per decision point.
    pub max_chord: u8,
    /// Probability that an emitted event becomes a long note.
    pub ln_rate: f32,
    stamina_boost: f32,
}

impl DifficultyModel {
    pub fn from_policy(policy: &StylePolicy, mix: &StyleMix, lane_count: u8) -> Self {
        let stamina_boost = mix.stamina_boost;
        let target_nps = (NPS_BASE + NPS_PER_STAR * policy.star_rating.max(0.5))
            * (1.0 + 0.3 * stamina_boost);

        let mut max_chord = 1 + (policy.star_rating / 3.0).ceil().max(1.0) as u8;
        if mix.jack_relax > 0.0 || mix.mass(crate::style::PatternKind::Handstream) > 0.0 {
            max_chord += 1;
        }
        let max_chord = max_chord.min(lane_count);

        DifficultyModel {
            target_nps,
            max_chord,
            ln_rate: mix.ln_rate,
            stamina_boost,
        }
    }

    /// Refuse targets the decision grid cannot carry even at full emission.
    pub fn check_feasible(&self, grid: &BeatGrid, step: u32) -> Result<()> {
        let slots_per_sec = (grid.bpm / 60.0) * 4.0 * (step.clamp(1, 100) as f32 / 100.0);
        let peak_weight = self.max_chord as f32 + CHORD_WEIGHT * (self.max_chord as f32 - 1.0);
        let capacity = slots_per_sec * peak_weight;
        if self.target_nps > capacity {
            let achieved = self.rating_for_nps(capacity);
            return Err(GenError::DifficultyUnreachable {
                requested: self.rating_for_nps(self.target_nps),
                achieved,
            });
        }
        Ok(())
    }

    /// Weighted note count used on both sides of the rating map: chord
    /// members beyond the first and jacked notes count extra.
    pub fn weighted_count(notes: &[NoteEvent], lane_count: u8) -> f32 {
        let mut weighted = 0.0f32;
        let mut last_in_lane = vec![f32::NEG_INFINITY; lane_count as usize];

        let mut i = 0;
        while i < notes.len() {
            // Group the chord sharing this timestamp
            let t = notes[i].time;
            let mut j = i;
            while j < notes.len() && (notes[j].time - t).abs() < 1e-4 {
                j += 1;
            }
            let size = j - i;
            weighted += size as f32 + CHORD_WEIGHT * (size as f32 - 1.0);

            for note in &notes[i..j] {
                if let Some(last) = last_in_lane.get_mut(note.lane as usize) {
                    if t - *last < JACK_RATING_WINDOW {
                        weighted += JACK_WEIGHT;
                    }
                    *last = note.end_time();
                }
            }
            i = j;
        }
        weighted
    }

    /// Realized star rating of a finished note sequence.
    pub fn rate(&self, notes: &[NoteEvent], duration: f32, lane_count: u8) -> f32 {
        if duration <= 0.0 || notes.is_empty() {
            return 0.0;
        }
        let nps = Self::weighted_count(notes, lane_count) / duration;
        self.rating_for_nps(nps)
    }

    fn rating_for_nps(&self, nps: f32) -> f32 {
        let flat = nps / (1.0 + 0.3 * self.stamina_boost);
        ((flat - NPS_BASE) / NPS_PER_STAR).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{PatternKind, StyleMix, StylePolicy};

    fn model_for(sr: f32) -> DifficultyModel {
        let mut policy = StylePolicy::default();
        policy.star_rating = sr;
        let mix = StyleMix::from_policy(&policy).unwrap();
        DifficultyModel::from_policy(&policy, &mix, 4)
    }

    #[test]
    fn test_target_density_monotonic_in_star_rating() {
        let mut prev = 0.0;
        for sr in [1.0, 2.0, 4.0, 6.0, 8.0, 10.0] {
            let model = model_for(sr);
            assert!(model.target_nps > prev, "nps not monotonic at sr={sr}");
            prev = model.target_nps;
        }
    }

    #[test]
    fn test_stamina_raises_density_at_same_rating() {
        let base = model_for(4.0);
        let mut policy = StylePolicy::default();
        policy.star_rating = 4.0;
        policy.enable(PatternKind::Stamina, 50);
        let mix = StyleMix::from_policy(&policy).unwrap();
        let stamina = DifficultyModel::from_policy(&policy, &mix, 4);
        assert!(stamina.target_nps > base.target_nps);
    }

    #[test]
    fn test_rating_inverts_density_map() {
        let model = model_for(4.0);
        // A plain stream realizing exactly the target weighted nps should
        // rate at the requested value.
        let duration = 60.0;
        let count = (model.target_nps * duration).round() as usize;
        let spacing = duration / count as f32;
        let notes: Vec<NoteEvent> = (0..count)
            .map(|i| NoteEvent {
                time: i as f32 * spacing,
                lane: (i % 4) as u8,
                duration: 0.0,
            })
            .collect();
        let rated = model.rate(&notes, duration, 4);
        assert!((rated - 4.0).abs() < 0.15, "rated {rated}");
    }

    #[test]
    fn test_chords_weigh_more_than_singles() {
        let singles = vec![
            NoteEvent { time: 0.0, lane: 0, duration: 0.0 },
            NoteEvent { time: 1.0, lane: 1, duration: 0.0 },
        ];
        let chord = vec![
            NoteEvent { time: 0.0, lane: 0, duration: 0.0 },
            NoteEvent { time: 0.0, lane: 1, duration: 0.0 },
        ];
        assert!(
            DifficultyModel::weighted_count(&chord, 4)
                > DifficultyModel::weighted_count(&singles, 4)
        );
    }

    #[test]
    fn test_infeasible_target_rejected() {
        let model = model_for(60.0);
        let grid = crate::beat_detection::BeatGrid::uniform(120.0, 30.0);
        let err = model.check_feasible(&grid, 100).unwrap_err();
        assert!(matches!(err, GenError::DifficultyUnreachable { .. }));
    }

    #[test]
    fn test_feasible_target_accepted() {
        let model = model_for(4.0);
        let grid = crate::beat_detection::BeatGrid::uniform(120.0, 30.0);
        assert!(model.check_feasible(&grid, 100).is_ok());
    }
}
