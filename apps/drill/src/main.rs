use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use beatwise_domain::{ExportFormat, PracticeState, PracticeStateSpace, ProfileExporter, SnapshotExporter};
use beatwise_tutor::{
    BeatScheduler, ClipLibrary, Clicker, PolicyVariant, SessionContext, SessionEvent,
    SessionSummary, TempoClips, TrainerConfig, TutorError,
};
use clap::{Parser, ValueEnum};
use rand::Rng;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a simulated rhythm practice session", long_about = None)]
struct Cli {
    /// YAML or JSON trainer configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of state visits in the session
    #[arg(long)]
    visits: Option<u32>,
    #[arg(long, value_enum)]
    variant: Option<Variant>,
    /// Seed for target beats and state selection
    #[arg(long)]
    seed: Option<u64>,
    /// Skill of the simulated player, from 0 (erratic) to 1 (perfect)
    #[arg(long, default_value_t = 0.8)]
    accuracy: f64,
    /// Time compression applied to every clip
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
    /// Print only the accuracy profile instead of the full summary
    #[arg(long)]
    profile_only: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Variant {
    Easy,
    Hard,
}

impl From<Variant> for PolicyVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Easy => PolicyVariant::Easy,
            Variant::Hard => PolicyVariant::Hard,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Yaml => ExportFormat::Yaml,
        }
    }
}

/// Tempo-derived clips played back `speed` times faster.
struct ScaledClips {
    inner: TempoClips,
    speed: f64,
}

impl ClipLibrary for ScaledClips {
    fn clip_duration(&self, state: &PracticeState) -> Result<Duration> {
        Ok(self.inner.clip_duration(state)?.div_f64(self.speed))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    ensure!((0.0..=1.0).contains(&cli.accuracy), "accuracy must lie in [0, 1]");
    ensure!(cli.speed > 0.0, "speed must be positive");

    let mut config = match &cli.config {
        Some(path) => TrainerConfig::load(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(visits) = cli.visits {
        config.session.visits = visits;
    }
    if let Some(variant) = cli.variant {
        config.session.policy = variant.into();
    }
    if cli.seed.is_some() {
        config.session.seed = cli.seed;
    }
    config.validate()?;

    let space = PracticeStateSpace::build(&config.catalog)?;
    let clips = ScaledClips {
        inner: TempoClips::new(config.session.cycle),
        speed: cli.speed,
    };
    let context = SessionContext::new(config.session.clone(), space, Box::new(clips))?;

    let summary = run_session(context, cli.accuracy, cli.speed).await?;
    let bytes = if cli.profile_only {
        SnapshotExporter.export(&summary.profile, cli.format.into())?
    } else {
        match cli.format {
            Format::Json => serde_json::to_vec_pretty(&summary)?,
            Format::Yaml => serde_yaml::to_string(&summary)?.into_bytes(),
        }
    };
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

async fn run_session(context: SessionContext, accuracy: f64, speed: f64) -> Result<SessionSummary> {
    let (tx, mut events) = unbounded_channel();
    let scheduler = BeatScheduler::start(context, tx)?;
    let (clicks, player) = spawn_player(scheduler.clicker());

    let mut rng = rand::thread_rng();
    let mut cycle_start = Instant::now();
    let mut beat = Duration::ZERO;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::NewState { key, bpm, .. } => {
                        cycle_start = Instant::now();
                        beat = Duration::from_secs_f64(60.0 / bpm as f64 / speed);
                        info!(%key, bpm, "practising");
                    }
                    SessionEvent::NewBeat { bar, beat: target, .. } => {
                        if rng.gen_bool((1.0 - accuracy) * 0.3) {
                            debug!(bar, "player sits this one out");
                            continue;
                        }
                        let spread = (1.0 - accuracy) * 2.5;
                        let offset = target as f64 + rng.gen_range(-spread..=spread);
                        let deadline = cycle_start + beat.mul_f64(offset.max(0.0));
                        if clicks.send(deadline).is_err() {
                            warn!("input thread stopped early");
                        }
                    }
                    SessionEvent::NewErrorValue { bar, score, .. } => info!(bar, score, "click scored"),
                    SessionEvent::CycleFinished { key, visit_average } => {
                        info!(%key, ?visit_average, "cycle finished");
                    }
                    SessionEvent::SessionEnded { reason } => {
                        info!(?reason, "session ended");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, ending session");
                scheduler.abort();
            }
        }
    }

    drop(clicks);
    let summary = scheduler.join().await?;
    if player.join().is_err() {
        warn!("input thread panicked");
    }
    Ok(summary)
}

/// Stands in for the UI thread: clicks at each deadline it is sent.
fn spawn_player(clicker: Clicker) -> (mpsc::Sender<Instant>, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Instant>();
    let handle = thread::spawn(move || {
        for deadline in rx {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            match clicker.click() {
                Ok(outcome) => debug!(?outcome, "clicked"),
                Err(TutorError::SessionAlreadyEnded) => break,
                Err(err) => warn!(%err, "click failed"),
            }
        }
    });
    (tx, handle)
}
