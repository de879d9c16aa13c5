use serde::{Deserialize, Serialize};

/// A single playable event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Seconds from track start.
    pub time: f32,
    /// Lane index in `[0, lane_count)`.
    pub lane: u8,
    /// Hold duration in seconds; 0 for a tap.
    pub duration: f32,
}

impl NoteEvent {
    pub fn is_long_note(&self) -> bool {
        self.duration > 0.001
    }

    pub fn end_time(&self) -> f32 {
        self.time + self.duration
    }
}

/// One finalized candidate chart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chart {
    pub title: String,
    pub artist: String,
    pub lane_count: u8,
    pub bpm: f32,
    pub seed: u64,
    /// Realized star rating, computed by the difficulty model.
    pub star_rating: f32,
    pub style_summary: String,
    /// Distance from the requested rating when the candidate was accepted
    /// outside tolerance.
    pub quality_shortfall: Option<f32>,
    pub notes: Vec<NoteEvent>,
}

impl Chart {
    /// Fraction of notes that are long notes.
    pub fn long_note_fraction(&self) -> f32 {
        if self.notes.is_empty() {
            return 0.0;
        }
        let ln = self.notes.iter().filter(|n| n.is_long_note()).count();
        ln as f32 / self.notes.len() as f32
    }

    /// Notes per second over the span of the chart.
    pub fn notes_per_second(&self, duration: f32) -> f32 {
        if duration <= 0.0 {
            return 0.0;
        }
        self.notes.len() as f32 / duration
    }

    /// Same-lane events must never overlap in time.
    pub fn has_lane_overlap(&self) -> bool {
        let mut per_lane: Vec<Vec<&NoteEvent>> = vec![Vec::new(); self.lane_count as usize];
        for note in &self.notes {
            if let Some(lane) = per_lane.get_mut(note.lane as usize) {
                lane.push(note);
            }
        }
        for lane in &per_lane {
            for pair in lane.windows(2) {
                if pair[1].time < pair[0].end_time() - 1e-4 {
                    return true;
                }
            }
        }
        false
    }

    /// A lane that never receives a note starves the pattern distribution.
    pub fn starved_lane(&self) -> Option<u8> {
        let mut seen = vec![false; self.lane_count as usize];
        for note in &self.notes {
            if let Some(s) = seen.get_mut(note.lane as usize) {
                *s = true;
            }
        }
        seen.iter().position(|&s| !s).map(|i| i as u8)
    }

    /// Count of same-lane pairs closer than `interval_ms` (jacks).
    pub fn jack_count(&self, interval_ms: f32) -> usize {
        let mut per_lane: Vec<Vec<f32>> = vec![Vec::new(); self.lane_count as usize];
        for note in &self.notes {
            if let Some(lane) = per_lane.get_mut(note.lane as usize) {
                lane.push(note.time);
            }
        }
        let mut count = 0;
        for lane in &per_lane {
            for pair in lane.windows(2) {
                if (pair[1] - pair[0]) * 1000.0 < interval_ms {
                    count += 1;
                }
            }
        }
        count
    }
}
