//! `motion-replay`: feeds a recorded JSONL sample stream through a motion session.
//!
//! ```bash
//! motion-replay --exercise bicep_curl session.jsonl > analysis.jsonl
//! cat session.jsonl | motion-replay --mode workout --weight 82
//! ```
//!
//! Each output line is one sample analysis; the session summary is printed last.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use edgefit_motion::{AnalyzerMode, EngineConfig, MotionSession, ProfileUpdate, Sample};

#[derive(Parser, Debug)]
#[command(name = "motion-replay", version, about = "Replay recorded IMU samples through the motion analyzer")]
struct Args {
    /// JSONL file with one sample per line. Reads stdin when omitted.
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// JSON engine configuration.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exercise to analyze (bicep_curl, lateral_raise, shoulder_press, running).
    #[arg(short, long)]
    exercise: Option<String>,

    /// Analyzer mode, overrides the config file.
    #[arg(long)]
    mode: Option<AnalyzerMode>,

    #[arg(long, value_name = "CM")]
    height: Option<f64>,

    #[arg(long, value_name = "KG")]
    weight: Option<f64>,

    #[arg(long)]
    age: Option<u32>,

    /// Skip lines that fail to parse instead of aborting.
    #[arg(long, default_value_t = false)]
    lenient: bool,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = match args.config.as_deref() {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    let mut session = MotionSession::new(config);
    session
        .set_user_profile(ProfileUpdate {
            height_cm: args.height,
            weight_kg: args.weight,
            age: args.age,
        })
        .context("invalid user profile")?;
    if let Some(exercise) = args.exercise.as_deref() {
        session.set_exercise(exercise);
    }

    let reader: Box<dyn BufRead> = match args.input.as_deref() {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };
    let mut out = BufWriter::new(io::stdout().lock());

    let mut processed = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = match serde_json::from_str(&line) {
            Ok(sample) => sample,
            Err(e) if args.lenient => {
                warn!(line = idx + 1, error = %e, "skipping malformed sample");
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("parsing sample on line {}", idx + 1)),
        };

        let analysis = session.process(&sample);
        serde_json::to_writer(&mut out, &analysis)?;
        out.write_all(b"\n")?;
        processed += 1;
    }

    let summary = session.summary();
    serde_json::to_writer(&mut out, &summary)?;
    out.write_all(b"\n")?;
    out.flush()?;

    info!(
        processed,
        reps = summary.total_reps,
        steps = summary.total_steps,
        calories = summary.calories_total,
        "replay finished"
    );
    Ok(())
}
