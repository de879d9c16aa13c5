use crate::error::{GenError, Result};
use serde::{Deserialize, Serialize};

/// The pattern vocabularies a generated chart can be biased toward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Chordjack,
    Stamina,
    Stream,
    Jumpstream,
    Handstream,
    Jackspeed,
    Technical,
}

impl PatternKind {
    pub const ALL: [PatternKind; 7] = [
        PatternKind::Chordjack,
        PatternKind::Stamina,
        PatternKind::Stream,
        PatternKind::Jumpstream,
        PatternKind::Handstream,
        PatternKind::Jackspeed,
        PatternKind::Technical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::Chordjack => "chordjack",
            PatternKind::Stamina => "stamina",
            PatternKind::Stream => "stream",
            PatternKind::Jumpstream => "jumpstream",
            PatternKind::Handstream => "handstream",
            PatternKind::Jackspeed => "jackspeed",
            PatternKind::Technical => "technical",
        }
    }
}

/// One tagged style-bias entry: an on/off switch plus a 0-100 weight.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PatternBias {
    pub kind: PatternKind,
    pub enabled: bool,
    pub weight: u8,
}

impl PatternBias {
    pub fn disabled(kind: PatternKind) -> Self {
        PatternBias {
            kind,
            enabled: false,
            weight: 17,
        }
    }
}

/// Map-type preset governing long-note usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapType {
    /// "Rice (LN < 10%)": taps dominate, long notes capped below 10%.
    Rice,
    /// Mixed taps and long notes at the requested ratio.
    Hybrid,
    /// Long-note centric.
    LongNote,
}

impl MapType {
    pub fn from_label(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        if lower.starts_with("rice") {
            Some(MapType::Rice)
        } else if lower.starts_with("hybrid") {
            Some(MapType::Hybrid)
        } else if lower.starts_with("ln") || lower.starts_with("long") {
            Some(MapType::LongNote)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MapType::Rice => "Rice (LN < 10%)",
            MapType::Hybrid => "Hybrid",
            MapType::LongNote => "Long Note",
        }
    }

    /// Clamp a requested long-note ratio to what the preset permits.
    pub fn clamp_ln_ratio(&self, ratio: f32) -> f32 {
        match self {
            MapType::Rice => ratio.clamp(0.0, 0.09),
            MapType::Hybrid => ratio.clamp(0.0, 1.0),
            MapType::LongNote => ratio.clamp(0.4, 1.0),
        }
    }

    /// Hard cap on the realized long-note fraction of a finished chart,
    /// where the preset advertises one.
    pub fn ln_fraction_cap(&self) -> Option<f32> {
        match self {
            MapType::Rice => Some(0.10),
            MapType::Hybrid | MapType::LongNote => None,
        }
    }
}

/// Full generation request: style biases plus the global knobs.
#[derive(Clone, Debug)]
pub struct StylePolicy {
    pub biases: Vec<PatternBias>,
    pub map_type: MapType,
    pub ln_ratio: f32,
    pub star_rating: f32,
    /// Decision-grid stride, 1-100. 100 considers every sixteenth slot.
    pub step: u32,
    /// Density multiplier relative to its default of 5.0.
    pub scale: f32,
    /// Minimum milliseconds between same-lane repeats.
    pub jack_interval_ms: f32,
    pub auto_snap: bool,
    pub seed: Option<u64>,
    pub count: usize,
}

impl Default for StylePolicy {
    fn default() -> Self {
        StylePolicy {
            biases: PatternKind::ALL.iter().map(|&k| PatternBias::disabled(k)).collect(),
            map_type: MapType::Rice,
            ln_ratio: 0.0,
            star_rating: 4.0,
            step: 100,
            scale: 5.0,
            jack_interval_ms: 90.0,
            auto_snap: true,
            seed: None,
            count: 1,
        }
    }
}

impl StylePolicy {
    pub fn bias(&self, kind: PatternKind) -> Option<&PatternBias> {
        self.biases.iter().find(|b| b.kind == kind)
    }

    pub fn enable(&mut self, kind: PatternKind, weight: u8) {
        match self.biases.iter_mut().find(|b| b.kind == kind) {
            Some(b) => {
                b.enabled = true;
                b.weight = weight.min(100);
            }
            None => self.biases.push(PatternBias {
                kind,
                enabled: true,
                weight: weight.min(100),
            }),
        }
    }

    /// One-line summary recorded in chart metadata.
    pub fn summary(&self) -> String {
        let active: Vec<String> = self
            .biases
            .iter()
            .filter(|b| b.enabled)
            .map(|b| format!("{}:{}", b.kind.name(), b.weight))
            .collect();
        if active.is_empty() {
            format!("{} baseline", self.map_type.label())
        } else {
            format!("{} [{}]", self.map_type.label(), active.join(" "))
        }
    }
}

/// Normalized generation policy produced by the mixer. Per-kind masses sum to
/// 1.0 together with the baseline mass.
#[derive(Clone, Debug)]
pub struct StyleMix {
    masses: Vec<(PatternKind, f32)>,
    pub baseline_mass: f32,
    /// 0..1 share of mass held by jack-flavored kinds; relaxes the
    /// jack-interval constraint proportionally.
    pub jack_relax: f32,
    /// 0..1 stamina emphasis; raises sustained density.
    pub stamina_boost: f32,
    pub ln_rate: f32,
    pub allow_long_notes: bool,
}

impl StyleMix {
    pub fn from_policy(policy: &StylePolicy) -> Result<Self> {
        let enabled: Vec<&PatternBias> = policy
            .biases
            .iter()
            .filter(|b| b.enabled && b.weight > 0)
            .collect();

        // The default Rice preset keeps a baseline active even with every
        // bias switched off.
        let clamped_ln = policy.map_type.clamp_ln_ratio(policy.ln_ratio);
        if enabled.is_empty() && policy.map_type != MapType::Rice && clamped_ln <= 0.0 {
            return Err(GenError::NoActiveStyle);
        }

        let weight_sum: f32 = enabled.iter().map(|b| b.weight as f32).sum();
        // Baseline keeps a floor so low weights perturb rather than dominate
        let baseline_raw = 100.0f32.max(weight_sum * 0.25);
        let total = weight_sum + baseline_raw;

        let masses: Vec<(PatternKind, f32)> = enabled
            .iter()
            .map(|b| (b.kind, b.weight as f32 / total))
            .collect();
        let baseline_mass = baseline_raw / total;

        let jack_relax = masses
            .iter()
            .filter(|(k, _)| matches!(k, PatternKind::Chordjack | PatternKind::Jackspeed))
            .map(|(_, m)| m)
            .sum::<f32>()
            .min(1.0);
        let stamina_boost = masses
            .iter()
            .filter(|(k, _)| *k == PatternKind::Stamina)
            .map(|(_, m)| m)
            .sum();

        let ln_rate = clamped_ln;
        let allow_long_notes = ln_rate > 0.0;

        let mix = StyleMix {
            masses,
            baseline_mass,
            jack_relax,
            stamina_boost,
            ln_rate,
            allow_long_notes,
        };
        log::debug!("style mix: {mix:?}");
        Ok(mix)
    }

    /// Mass assigned to one pattern kind (zero when disabled).
    pub fn mass(&self, kind: PatternKind) -> f32 {
        self.masses
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, m)| *m)
            .unwrap_or(0.0)
    }

    /// Pattern kinds with nonzero mass, in declaration order.
    pub fn active(&self) -> impl Iterator<Item = (PatternKind, f32)> + '_ {
        self.masses.iter().copied()
    }

    /// Draw a pattern kind from the mass distribution given a uniform roll in
    /// 0..1; `None` means the baseline was drawn.
    pub fn pick(&self, roll: f32) -> Option<PatternKind> {
        let mut acc = 0.0;
        for &(kind, mass) in &self.masses {
            acc += mass;
            if roll < acc {
                return Some(kind);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_type_labels_round_trip() {
        assert_eq!(MapType::from_label("Rice (LN < 10%)"), Some(MapType::Rice));
        assert_eq!(MapType::from_label("hybrid"), Some(MapType::Hybrid));
        assert_eq!(MapType::from_label("LN-heavy"), Some(MapType::LongNote));
        assert_eq!(MapType::from_label("bogus"), None);
    }

    #[test]
    fn test_rice_caps_long_note_ratio() {
        assert!(MapType::Rice.clamp_ln_ratio(0.5) < 0.10);
        assert_eq!(MapType::Hybrid.clamp_ln_ratio(0.5), 0.5);
    }

    #[test]
    fn test_only_rice_carries_a_realized_fraction_cap() {
        assert_eq!(MapType::Rice.ln_fraction_cap(), Some(0.10));
        assert_eq!(MapType::Hybrid.ln_fraction_cap(), None);
        assert_eq!(MapType::LongNote.ln_fraction_cap(), None);
    }

    #[test]
    fn test_all_disabled_rice_still_mixes() {
        let policy = StylePolicy::default();
        let mix = StyleMix::from_policy(&policy).unwrap();
        assert!(mix.baseline_mass > 0.99);
        assert_eq!(mix.mass(PatternKind::Stream), 0.0);
        assert_eq!(mix.jack_relax, 0.0);
    }

    #[test]
    fn test_no_active_style_rejected() {
        let mut policy = StylePolicy::default();
        policy.map_type = MapType::Hybrid;
        policy.ln_ratio = 0.0;
        let err = StyleMix::from_policy(&policy).unwrap_err();
        assert!(matches!(err, GenError::NoActiveStyle));
    }

    #[test]
    fn test_enabled_kinds_get_proportional_mass() {
        let mut policy = StylePolicy::default();
        policy.enable(PatternKind::Stream, 40);
        policy.enable(PatternKind::Jumpstream, 20);
        let mix = StyleMix::from_policy(&policy).unwrap();
        let s = mix.mass(PatternKind::Stream);
        let j = mix.mass(PatternKind::Jumpstream);
        assert!(s > 0.0 && j > 0.0);
        assert!((s / j - 2.0).abs() < 1e-4);
        let total: f32 = mix.active().map(|(_, m)| m).sum::<f32>() + mix.baseline_mass;
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_jack_relax_tracks_chordjack_weight() {
        let mut policy = StylePolicy::default();
        policy.enable(PatternKind::Chordjack, 17);
        let mix = StyleMix::from_policy(&policy).unwrap();
        assert!(mix.jack_relax > 0.0);
        let mut heavier = StylePolicy::default();
        heavier.enable(PatternKind::Chordjack, 80);
        let heavier_mix = StyleMix::from_policy(&heavier).unwrap();
        assert!(heavier_mix.jack_relax > mix.jack_relax);
    }

    #[test]
    fn test_pick_is_exhaustive_over_roll_range() {
        let mut policy = StylePolicy::default();
        policy.enable(PatternKind::Handstream, 100);
        let mix = StyleMix::from_policy(&policy).unwrap();
        assert_eq!(mix.pick(0.0), Some(PatternKind::Handstream));
        assert_eq!(mix.pick(0.999), None); // baseline
    }

    #[test]
    fn test_summary_names_active_biases() {
        let mut policy = StylePolicy::default();
        policy.enable(PatternKind::Technical, 33);
        assert!(policy.summary().contains("technical:33"));
    }
}
