use crate::chart::Chart;
use crate::error::{GenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Self-contained chart package payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChartPackage {
    pub format_version: u32,
    pub title: String,
    pub artist: String,
    pub lane_count: u8,
    pub bpm: f32,
    pub seed: u64,
    pub star_rating: f32,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_shortfall: Option<f32>,
    pub generated_at: i64,
    pub notes: Vec<NotePayload>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotePayload {
    pub time: f32,
    pub lane: u8,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub duration: f32,
}

fn is_zero(n: &f32) -> bool {
    *n < 0.001
}

impl ChartPackage {
    pub fn new(chart: &Chart) -> Self {
        let generated_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let notes = chart
            .notes
            .iter()
            .map(|n| NotePayload {
                time: n.time,
                lane: n.lane,
                duration: n.duration,
            })
            .collect();

        ChartPackage {
            format_version: 1,
            title: chart.title.clone(),
            artist: chart.artist.clone(),
            lane_count: chart.lane_count,
            bpm: chart.bpm,
            seed: chart.seed,
            star_rating: chart.star_rating,
            style: chart.style_summary.clone(),
            quality_shortfall: chart.quality_shortfall,
            generated_at,
            notes,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Sectioned text rendering of the package.
    pub fn to_chart(&self) -> String {
        let mut output = String::new();

        output.push_str("[SONG]\n");
        output.push_str(&format!("  Title = \"{}\"\n", self.title));
        output.push_str(&format!("  Artist = \"{}\"\n", self.artist));
        output.push_str(&format!("  BPM = {}\n", self.bpm));
        output.push_str(&format!("  Seed = {}\n\n", self.seed));

        output.push_str("[NOTES]\n");
        output.push_str(&format!("  Stars = {:.2}\n", self.star_rating));
        output.push_str(&format!("  Style = {}\n", self.style));
        output.push_str(&format!("  Lanes = {}\n", self.lane_count));
        output.push_str(&format!("  Notes = {}\n", self.notes.len()));
        output.push_str(":\n");

        for note in &self.notes {
            let note_type = if note.duration > 0.001 { '2' } else { '1' };
            output.push_str(&format!(
                "  {}|{}|{:.3}\n",
                note_type, note.lane, note.time
            ));
            if note.duration > 0.001 {
                output.push_str(&format!("  2|{}|{:.3}\n", note.lane, note.duration));
            }
        }

        output.push_str(";\n");
        output
    }

    /// Derived package file name for candidate `index`.
    pub fn file_name(&self, index: usize, format: PackageFormat) -> String {
        let stem = sanitize(&format!("{} - {} [gen-{}]", self.artist, self.title, index));
        format!("{}.{}", stem, format.extension())
    }

    /// Write the package into `dir`, overwriting any existing file of the
    /// same derived name. Returns the written path.
    pub fn save(&self, dir: &Path, index: usize, format: PackageFormat) -> Result<PathBuf> {
        let path = dir.join(self.file_name(index, format));
        let content = match format {
            PackageFormat::Json => self.to_json().map_err(|e| GenError::Packaging {
                path: path.clone(),
                source: e.into(),
            })?,
            PackageFormat::Chart => self.to_chart(),
        };

        std::fs::create_dir_all(dir).map_err(|e| GenError::Packaging {
            path: dir.to_path_buf(),
            source: e,
        })?;
        std::fs::write(&path, content).map_err(|e| GenError::Packaging {
            path: path.clone(),
            source: e,
        })?;
        log::info!("packaged chart: {}", path.display());
        Ok(path)
    }
}

/// Strip characters that are unsafe in file names.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageFormat {
    Json,
    Chart,
}

impl PackageFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(PackageFormat::Json),
            "chart" => Some(PackageFormat::Chart),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            PackageFormat::Json => "chart.json",
            PackageFormat::Chart => "chart",
        }
    }
}
