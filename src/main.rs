use anyhow::Result;
use clap::Parser;
use mapforge::packager::PackageFormat;
use mapforge::progress::{CancelToken, LogProgress};
use mapforge::style::{MapType, PatternKind, StylePolicy};
use mapforge::{Generator, GeneratorConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate a beatmap from an audio file", long_about = None)]
struct Args {
    /// Path to the input audio file (WAV)
    #[arg(long)]
    audio_path: PathBuf,

    /// Title of the song
    #[arg(long)]
    title: String,

    /// Artist of the song
    #[arg(long)]
    artist: String,

    /// Directory to save generated chart packages
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Target star rating (difficulty)
    #[arg(long, default_value = "4.0")]
    star_rating: f32,

    /// Number of candidate charts to generate
    #[arg(long, default_value = "1")]
    count: usize,

    /// Random seed; omit for a random one
    #[arg(long)]
    seed: Option<u64>,

    /// Bias toward chordjack patterns
    #[arg(long)]
    chordjack: bool,
    /// Chordjack intensity, 0-100
    #[arg(long, default_value = "17")]
    chordjack_weight: u8,

    /// Bias toward stamina
    #[arg(long)]
    stamina: bool,
    #[arg(long, default_value = "17")]
    stamina_weight: u8,

    /// Bias toward streams
    #[arg(long)]
    stream: bool,
    #[arg(long, default_value = "17")]
    stream_weight: u8,

    /// Bias toward jumpstreams
    #[arg(long)]
    jumpstream: bool,
    #[arg(long, default_value = "17")]
    jumpstream_weight: u8,

    /// Bias toward handstreams
    #[arg(long)]
    handstream: bool,
    #[arg(long, default_value = "17")]
    handstream_weight: u8,

    /// Bias toward jackspeed
    #[arg(long)]
    jackspeed: bool,
    #[arg(long, default_value = "17")]
    jackspeed_weight: u8,

    /// Bias toward technical patterns
    #[arg(long)]
    technical: bool,
    #[arg(long, default_value = "17")]
    technical_weight: u8,

    /// Map type preset (rice, hybrid, long-note)
    #[arg(long, default_value = "rice")]
    map_type: String,

    /// Long-note ratio, 0.0-1.0
    #[arg(long, default_value = "0.0")]
    ln_ratio: f32,

    /// Decision-grid stride, 1-100
    #[arg(long, default_value = "100")]
    step: u32,

    /// Density multiplier
    #[arg(long, default_value = "5.0")]
    scale: f32,

    /// Minimum milliseconds between same-lane repeats
    #[arg(long, default_value = "90")]
    jack_interval: f32,

    /// Keep raw onset-refined timestamps instead of snapping to the grid
    #[arg(long)]
    no_auto_snap: bool,

    /// Package format (json or chart)
    #[arg(long, default_value = "json")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_default_env()
        .filter_level(level.parse()?)
        .init();

    let format = PackageFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Invalid format: {}", args.format))?;
    let map_type = MapType::from_label(&args.map_type)
        .ok_or_else(|| anyhow::anyhow!("Unknown map type: {}", args.map_type))?;

    let mut policy = StylePolicy::default();
    policy.map_type = map_type;
    policy.ln_ratio = args.ln_ratio;
    policy.star_rating = args.star_rating;
    policy.step = args.step;
    policy.scale = args.scale;
    policy.jack_interval_ms = args.jack_interval;
    policy.auto_snap = !args.no_auto_snap;
    policy.seed = args.seed;
    policy.count = args.count;

    let biases = [
        (args.chordjack, args.chordjack_weight, PatternKind::Chordjack),
        (args.stamina, args.stamina_weight, PatternKind::Stamina),
        (args.stream, args.stream_weight, PatternKind::Stream),
        (args.jumpstream, args.jumpstream_weight, PatternKind::Jumpstream),
        (args.handstream, args.handstream_weight, PatternKind::Handstream),
        (args.jackspeed, args.jackspeed_weight, PatternKind::Jackspeed),
        (args.technical, args.technical_weight, PatternKind::Technical),
    ];
    for (enabled, weight, kind) in biases {
        if enabled {
            policy.enable(kind, weight);
        }
    }

    log::info!(
        "Starting generation for {} - {} ({})",
        args.artist,
        args.title,
        policy.summary()
    );

    let generator = Generator::new(GeneratorConfig {
        output_dir: args.output_dir.clone(),
        format,
        ..GeneratorConfig::default()
    });

    let bundle = generator.generate(
        &args.audio_path,
        &args.title,
        &args.artist,
        &policy,
        &LogProgress,
        &CancelToken::new(),
    )?;

    for (index, failure) in &bundle.failures {
        log::warn!("candidate {index} failed: {failure}");
    }

    print_summary(&bundle);
    Ok(())
}

fn print_summary(bundle: &mapforge::candidate::ChartBundle) {
    println!("\n=== Chart Summary (base seed {}) ===", bundle.base_seed);
    for packaged in &bundle.charts {
        let shortfall = packaged
            .chart
            .quality_shortfall
            .map(|d| format!(" (off target by {d:.2})"))
            .unwrap_or_default();
        println!(
            "{:.2}* | {} notes | {}{}",
            packaged.chart.star_rating,
            packaged.chart.notes.len(),
            packaged.path.display(),
            shortfall
        );
    }
    println!("=== End Summary ===\n");
}
