use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ember::{
    Camera, DemoInput, DetectorConfig, Engine, FrameOutcome, GammaTable, Monitor, ReplayCamera,
    StatusReport, demo_model,
};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "ember_replay")]
#[command(about = "Replay JPEG frames through the ember fire monitor")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(name = "replay")]
    Replay(ReplayArgs),
    #[command(name = "gamma")]
    Gamma(GammaArgs),
    #[command(name = "demo-model")]
    DemoModel(DemoModelArgs),
}

#[derive(Args, Debug, Clone)]
struct ReplayArgs {
    #[arg(long, required = true)]
    model: PathBuf,
    /// Directory of .jpg/.jpeg frames, replayed in file-name order
    #[arg(long, required = true)]
    frames: PathBuf,
    /// JSON override for the detector configuration
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    loops: usize,
}

#[derive(Args, Debug, Clone)]
struct GammaArgs {
    #[arg(long, default_value_t = ember::config::GAMMA)]
    exponent: f32,
}

#[derive(Args, Debug, Clone)]
struct DemoModelArgs {
    #[arg(long, required = true)]
    out: PathBuf,
    #[arg(long, value_enum, default_value_t = InputKind::U8)]
    input: InputKind,
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
    classes: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum InputKind {
    U8,
    I8,
    F32,
}

impl From<InputKind> for DemoInput {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::U8 => DemoInput::U8,
            InputKind::I8 => DemoInput::I8,
            InputKind::F32 => DemoInput::F32,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FrameLine<'a> {
    frame: u64,
    file: &'a str,
    classified: bool,
    #[serde(flatten)]
    status: StatusReport,
}

#[derive(Debug, Clone, Serialize)]
struct ReplaySummary {
    frames: u64,
    classified: u64,
    fire_frames: u64,
    max_score: f32,
    decimation: u64,
    threshold: f32,
    elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
struct GammaDump<'a> {
    exponent: f32,
    table: &'a [u8],
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Replay(args) => run_replay(args),
        Command::Gamma(args) => run_gamma(args),
        Command::DemoModel(args) => run_demo_model(args),
    }
}

fn run_replay(args: ReplayArgs) -> Result<()> {
    ensure_file_exists(&args.model, "model")?;
    let config = match &args.config {
        Some(path) => read_json::<DetectorConfig>(path)?,
        None => DetectorConfig::default(),
    };
    let model = fs::read(&args.model)
        .with_context(|| format!("reading model {}", args.model.display()))?;
    let (names, frames) = load_frames(&args.frames)?;

    let mut engine = Engine::new(&model, config.engine);
    engine
        .init(config.gamma)
        .with_context(|| format!("booting {}", args.model.display()))?;
    tracing::info!(
        frames = frames.len(),
        loops = args.loops,
        decimation = config.policy.decimation,
        "replay started"
    );

    let monitor = Monitor::new(engine, config.policy);
    let mut camera = ReplayCamera::new(frames);
    let total = camera.len() * args.loops;

    let mut summary = ReplaySummary {
        frames: 0,
        classified: 0,
        fire_frames: 0,
        max_score: 0.0,
        decimation: monitor.policy().decimation(),
        threshold: monitor.policy().threshold(),
        elapsed_ms: 0.0,
    };
    let start = Instant::now();

    for i in 0..total {
        let outcome = {
            let frame = camera.acquire().context("acquiring frame")?;
            monitor.on_frame(&frame)
        };
        let status = monitor.status();
        if let FrameOutcome::Classified { snapshot, .. } = outcome {
            summary.classified += 1;
            summary.max_score = summary.max_score.max(snapshot.score);
        }
        if status.fire {
            summary.fire_frames += 1;
        }
        summary.frames += 1;

        let line = FrameLine {
            frame: outcome.index(),
            file: &names[i % names.len()],
            classified: outcome.is_classified(),
            status,
        };
        println!(
            "{}",
            serde_json::to_string(&line).context("serializing frame line")?
        );
    }

    summary.elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
    println!(
        "{}",
        serde_json::to_string(&summary).context("serializing summary")?
    );
    Ok(())
}

fn run_gamma(args: GammaArgs) -> Result<()> {
    let table = GammaTable::new(args.exponent);
    let dump = GammaDump {
        exponent: args.exponent,
        table: table.as_slice(),
    };
    println!(
        "{}",
        serde_json::to_string(&dump).context("serializing gamma table")?
    );
    Ok(())
}

fn run_demo_model(args: DemoModelArgs) -> Result<()> {
    let bytes = demo_model(args.input.into(), usize::from(args.classes));
    if let Some(dir) = args.out.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(&args.out, &bytes).with_context(|| format!("writing {}", args.out.display()))?;
    println!(
        "wrote {} ({} bytes, input {:?}, {} classes)",
        args.out.display(),
        bytes.len(),
        args.input,
        args.classes
    );
    Ok(())
}

fn load_frames(dir: &Path) -> Result<(Vec<String>, Vec<Vec<u8>>)> {
    if !dir.is_dir() {
        bail!("frames path is not a directory: {}", dir.display());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("listing {}", dir.display()))?
            .path();
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
        if is_jpeg && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        bail!("no .jpg/.jpeg frames in {}", dir.display());
    }

    let mut names = Vec::with_capacity(paths.len());
    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        frames.push(fs::read(&path).with_context(|| format!("reading {}", path.display()))?);
        names.push(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
    }
    Ok((names, frames))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing json {}", path.display()))
}

fn ensure_file_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} file does not exist: {}", what, path.display());
    }
    if !path.is_file() {
        bail!("{} path is not a file: {}", what, path.display());
    }
    Ok(())
}
