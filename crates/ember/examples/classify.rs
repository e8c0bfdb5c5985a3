//! Example: score JPEG frames with the fire classifier.
//!
//! Boots an [`Engine`] from a model file (or the built-in demo model when
//! `--model` is omitted) and runs one prediction per frame. Without
//! `--frames`, three synthetic 320x240 frames are encoded in memory: a
//! saturated red one, a mid grey one and a dark one.
//!
//! Per-frame scores and timing are printed to stdout; `--out` also writes
//! them as JSON.
//!
//! Run from the workspace root:
//!   cargo run -p ember --example classify -- --help
//!   cargo run -p ember --example classify -- --frames data/flame.jpg

use std::io::Cursor;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ember::{DemoInput, DetectorConfig, Engine, StatusReport, demo_model};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::Serialize;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Score JPEG frames with the fire classifier")]
struct Args {
    /// Serialized model (default: built-in demo model)
    #[arg(long)]
    model: Option<PathBuf>,

    /// JPEG frames to score (default: synthetic red, grey and dark frames)
    #[arg(long, num_args = 1..)]
    frames: Vec<PathBuf>,

    /// Gamma exponent applied before inference
    #[arg(long, default_value_t = ember::config::GAMMA)]
    gamma: f32,

    /// Output JSON path
    #[arg(long)]
    out: Option<PathBuf>,
}

// ── JSON DTOs ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FrameResult {
    frame: String,
    bytes: usize,
    score: f32,
    fire: bool,
    /// Wall-clock time for decode, preprocessing and inference, in milliseconds.
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct Summary {
    model: String,
    gamma: f32,
    threshold: f32,
    arena_size: usize,
    frames: Vec<FrameResult>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn synthetic_frame(color: [u8; 3]) -> Result<Vec<u8>> {
    let img = RgbImage::from_pixel(
        ember::config::SOURCE_WIDTH as u32,
        ember::config::SOURCE_HEIGHT as u32,
        Rgb(color),
    );
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("encoding synthetic frame")?;
    Ok(bytes)
}

fn load_frames(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    if paths.is_empty() {
        return Ok(vec![
            ("synthetic:red".into(), synthetic_frame([255, 0, 0])?),
            ("synthetic:grey".into(), synthetic_frame([120, 120, 120])?),
            ("synthetic:dark".into(), synthetic_frame([10, 10, 10])?),
        ]);
    }
    paths
        .iter()
        .map(|p| {
            let bytes = std::fs::read(p).with_context(|| format!("reading {}", p.display()))?;
            Ok((p.display().to_string(), bytes))
        })
        .collect()
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = DetectorConfig {
        gamma: args.gamma,
        ..DetectorConfig::default()
    };

    let (model_name, model) = match &args.model {
        Some(path) => (
            path.display().to_string(),
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        None => ("demo:u8".to_string(), demo_model(DemoInput::U8, 2)),
    };

    let mut engine = Engine::new(&model, config.engine);
    engine
        .init(config.gamma)
        .with_context(|| format!("booting {model_name}"))?;
    println!(
        "loaded {model_name}: {} bytes, input {:?}",
        model.len(),
        engine.input_repr()
    );

    let frames = load_frames(&args.frames)?;
    if frames.is_empty() {
        bail!("no frames to score");
    }

    let threshold = config.policy.threshold;
    let mut results = Vec::with_capacity(frames.len());
    let total_start = Instant::now();

    for (name, jpeg) in &frames {
        let t0 = Instant::now();
        let score = engine
            .try_predict(jpeg)
            .with_context(|| format!("classifying {name}"))?;
        let elapsed_ms = t0.elapsed().as_secs_f64() * 1e3;
        let fire = score > threshold;
        let report = StatusReport::from(ember::DetectionSnapshot { fire, score });
        println!("  {name}: {}  ({elapsed_ms:.2} ms)", report.to_json());

        results.push(FrameResult {
            frame: name.clone(),
            bytes: jpeg.len(),
            score,
            fire,
            elapsed_ms,
        });
    }

    let total_ms = total_start.elapsed().as_secs_f64() * 1e3;
    println!("total: {total_ms:.2} ms for {} frames", results.len());

    if let Some(out) = &args.out {
        let summary = Summary {
            model: model_name,
            gamma: config.gamma,
            threshold,
            arena_size: config.engine.arena_size,
            frames: results,
        };
        let json = serde_json::to_string_pretty(&summary).context("serializing results")?;
        std::fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
        println!("results written to {}", out.display());
    }

    Ok(())
}
