pub mod audio;
pub mod beat_detection;
pub mod candidate;
pub mod chart;
pub mod difficulty;
pub mod error;
pub mod packager;
pub mod pattern;
pub mod progress;
pub mod style;

use audio::Waveform;
use beat_detection::BeatGrid;
use candidate::{CandidateContext, ChartBundle};
use difficulty::DifficultyModel;
use error::Result;
use packager::PackageFormat;
use progress::{CancelToken, ProgressSink};
use rand::Rng;
use std::path::{Path, PathBuf};
use style::{StyleMix, StylePolicy};

/// Engine configuration, distinct from the per-request [`StylePolicy`].
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub lane_count: u8,
    pub output_dir: PathBuf,
    pub format: PackageFormat,
    /// Accepted band around the requested star rating.
    pub tolerance: f32,
    /// Regeneration budget per candidate.
    pub max_attempts: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            lane_count: 4,
            output_dir: PathBuf::from("outputs"),
            format: PackageFormat::Json,
            tolerance: 0.3,
            max_attempts: 4,
        }
    }
}

/// The generation engine. Stateless between invocations; every request is
/// driven entirely by its inputs.
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Generator { config }
    }

    /// Full pipeline: decode, analyze, and generate `policy.count` packaged
    /// candidate charts.
    pub fn generate(
        &self,
        audio_path: &Path,
        title: &str,
        artist: &str,
        policy: &StylePolicy,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ChartBundle> {
        let waveform = Waveform::load(audio_path)?;
        log::info!(
            "decoded {}: {:.1}s at {} Hz",
            audio_path.display(),
            waveform.duration(),
            waveform.sample_rate
        );
        self.generate_from_waveform(&waveform, title, artist, policy, progress, cancel)
    }

    /// Entry point for callers that already hold decoded audio.
    pub fn generate_from_waveform(
        &self,
        waveform: &Waveform,
        title: &str,
        artist: &str,
        policy: &StylePolicy,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ChartBundle> {
        let mono = waveform.to_mono();
        let grid = BeatGrid::from_waveform(&mono, waveform.sample_rate);
        log::info!("beat grid: {:.1} BPM over {:.1}s", grid.bpm, grid.duration);
        self.generate_on_grid(&grid, title, artist, policy, progress, cancel)
    }

    /// Generate against a prepared beat grid.
    pub fn generate_on_grid(
        &self,
        grid: &BeatGrid,
        title: &str,
        artist: &str,
        policy: &StylePolicy,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ChartBundle> {
        // Degenerate style configurations fail before any generation
        let mix = StyleMix::from_policy(policy)?;
        let model = DifficultyModel::from_policy(policy, &mix, self.config.lane_count);
        model.check_feasible(grid, policy.step)?;

        let base_seed = policy
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen::<u64>());
        log::info!(
            "generating {} candidate(s), base seed {base_seed}, target {:.1} stars",
            policy.count.max(1),
            policy.star_rating
        );

        let ctx = CandidateContext {
            grid,
            mix: &mix,
            model: &model,
            policy,
            title,
            artist,
            lane_count: self.config.lane_count,
            tolerance: self.config.tolerance,
            max_attempts: self.config.max_attempts,
            output_dir: &self.config.output_dir,
            format: self.config.format,
        };
        candidate::generate_bundle(&ctx, base_seed, progress, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress::NullProgress;
    use style::{MapType, PatternKind};

    fn generator(dir: &Path) -> Generator {
        Generator::new(GeneratorConfig {
            output_dir: dir.to_path_buf(),
            ..GeneratorConfig::default()
        })
    }

    fn rice_policy(seed: u64) -> StylePolicy {
        let mut policy = StylePolicy::default();
        policy.star_rating = 4.0;
        policy.map_type = MapType::Rice;
        policy.ln_ratio = 0.0;
        policy.seed = Some(seed);
        policy.count = 1;
        policy
    }

    #[test]
    fn test_rice_scenario_120s_120bpm() {
        // 120s of 120 BPM, sr 4.0, all biases disabled, Rice, seed 42
        let dir = tempfile::tempdir().unwrap();
        let grid = BeatGrid::uniform(120.0, 120.0);
        let policy = rice_policy(42);

        let bundle = generator(dir.path())
            .generate_on_grid(&grid, "Song", "Artist", &policy, &NullProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(bundle.charts.len(), 1);
        let chart = &bundle.charts[0].chart;
        assert!(chart.long_note_fraction() < 0.10);
        assert!(
            (chart.star_rating - 4.0).abs() <= 0.3,
            "realized rating {} outside tolerance",
            chart.star_rating
        );
        assert!(bundle.charts[0].path.exists());
    }

    #[test]
    fn test_chordjack_scenario_raises_jacks() {
        let dir = tempfile::tempdir().unwrap();
        let grid = BeatGrid::uniform(120.0, 120.0);
        let gen = generator(dir.path());

        let baseline = gen
            .generate_on_grid(&grid, "Song", "Artist", &rice_policy(42), &NullProgress, &CancelToken::new())
            .unwrap();

        let mut cj = rice_policy(42);
        cj.enable(PatternKind::Chordjack, 17);
        let chordjack = gen
            .generate_on_grid(&grid, "Song", "Artist", &cj, &NullProgress, &CancelToken::new())
            .unwrap();

        let window_ms = difficulty::JACK_RATING_WINDOW * 1000.0;
        let base_jacks = baseline.charts[0].chart.jack_count(window_ms);
        let cj_jacks = chordjack.charts[0].chart.jack_count(window_ms);
        assert!(
            cj_jacks > base_jacks,
            "chordjack jacks {cj_jacks} not above baseline {base_jacks}"
        );
    }

    #[test]
    fn test_full_request_is_deterministic_per_seed() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let grid = BeatGrid::uniform(140.0, 45.0);
        let policy = rice_policy(7);

        let a = generator(dir_a.path())
            .generate_on_grid(&grid, "S", "A", &policy, &NullProgress, &CancelToken::new())
            .unwrap();
        let b = generator(dir_b.path())
            .generate_on_grid(&grid, "S", "A", &policy, &NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(a.charts[0].chart.notes, b.charts[0].chart.notes);
    }

    #[test]
    fn test_no_active_style_fails_before_generation() {
        let dir = tempfile::tempdir().unwrap();
        let grid = BeatGrid::uniform(120.0, 30.0);
        let mut policy = StylePolicy::default();
        policy.map_type = MapType::Hybrid;
        policy.ln_ratio = 0.0;
        policy.seed = Some(1);

        let err = generator(dir.path())
            .generate_on_grid(&grid, "S", "A", &policy, &NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, error::GenError::NoActiveStyle));
        // Nothing was written
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_end_to_end_from_synthesized_waveform() {
        // 20s click track at 120 BPM
        let sample_rate = 8000u32;
        let mut samples = vec![0.0f32; sample_rate as usize * 20];
        let mut t = 0.0f32;
        while t < 20.0 {
            let start = (t * sample_rate as f32) as usize;
            for i in 0..200usize.min(samples.len() - start) {
                samples[start + i] = ((i as f32 * 0.9).sin()) * (1.0 - i as f32 / 200.0);
            }
            t += 0.5;
        }
        let waveform = Waveform {
            samples,
            sample_rate,
            channels: 1,
        };

        let dir = tempfile::tempdir().unwrap();
        let bundle = generator(dir.path())
            .generate_from_waveform(
                &waveform,
                "Click",
                "Metronome",
                &rice_policy(3),
                &NullProgress,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(bundle.charts.len(), 1);
        assert!(!bundle.charts[0].chart.notes.is_empty());
    }
}
