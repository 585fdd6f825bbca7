use anyhow::{Context, Result};
use clap::Parser;
use pose_live::config::{build_ws_url, Config};
use pose_live::session::{ConnectionState, RunState, SessionClient, SessionOptions, SessionSnapshot};
use pose_live::transport::websocket::WebSocketConnector;
use pose_proto::{AudioBot, Exercise, Language, Preferences};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pose-live",
    about = "Stream a live exercise session from the pose-estimation server"
)]
struct Cli {
    /// Pose server address: host:port or a full ws:// / wss:// URL
    #[arg(long, env = "POSE_LIVE_SERVER")]
    server: Option<String>,

    /// Exercise to run (squats, warrior, leg-raises, lunges)
    #[arg(long, default_value = "squats")]
    exercise: Exercise,

    /// Spoken feedback (on|off)
    #[arg(long, env = "POSE_LIVE_AUDIOBOT")]
    audiobot: Option<AudioBot>,

    /// Spoken-feedback language (en|ur)
    #[arg(long, env = "POSE_LIVE_LANGUAGE")]
    language: Option<Language>,

    /// Write received frames and audio clips into this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Stop after this many seconds (runs until Ctrl-C when absent)
    #[arg(long)]
    duration: Option<u64>,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .context("failed to initialise tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let defaults = Config::from_env();
    let server = cli.server.unwrap_or(defaults.server);
    let preferences = Preferences {
        audiobot: cli.audiobot.unwrap_or(defaults.preferences.audiobot),
        language: cli.language.or(defaults.preferences.language),
    };

    if let Some(dir) = &cli.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let url = build_ws_url(&server);
    tracing::info!(%url, exercise = %cli.exercise, "starting live session");

    let connector = Arc::new(WebSocketConnector::new(url));
    let options = SessionOptions {
        preferences,
        client_label: Some("pose-live-cli".to_string()),
    };
    let mut handle = SessionClient::spawn(connector, options);
    let mut audio = handle.take_audio().expect("audio stream already taken");
    let mut snapshots = handle.subscribe();

    handle.connect().context("session task unavailable")?;

    let deadline = cli
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut render = Renderer::new(cli.out_dir.clone());
    let mut started = false;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.connection == ConnectionState::Connected
                    && snapshot.run == RunState::Idle
                    && !started
                {
                    handle.start(cli.exercise).context("session task unavailable")?;
                    started = true;
                }
                if snapshot.connection == ConnectionState::Disconnected {
                    started = false;
                }
                render.update(&snapshot)?;
            }
            Some(clip) = audio.recv() => {
                render.audio(&clip)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, disconnecting");
                break;
            }
            _ = sleep_until_opt(deadline) => {
                tracing::info!("session duration elapsed, disconnecting");
                break;
            }
        }
    }

    let _ = handle.disconnect();
    Ok(())
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Prints state changes and optionally persists frames/audio for inspection.
struct Renderer {
    out_dir: Option<PathBuf>,
    last_connection: Option<ConnectionState>,
    last_feedback: Option<String>,
    last_error: Option<String>,
    last_rep_count: u32,
    last_frame: Option<Vec<u8>>,
    frames_written: u64,
    clips_written: u64,
}

impl Renderer {
    fn new(out_dir: Option<PathBuf>) -> Self {
        Self {
            out_dir,
            last_connection: None,
            last_feedback: None,
            last_error: None,
            last_rep_count: 0,
            last_frame: None,
            frames_written: 0,
            clips_written: 0,
        }
    }

    fn update(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        if self.last_connection != Some(snapshot.connection) {
            self.last_connection = Some(snapshot.connection);
            let label = match snapshot.connection {
                ConnectionState::Connected => "connected",
                ConnectionState::Connecting => "connecting...",
                ConnectionState::Disconnected => "disconnected",
            };
            println!("status: {label}");
        }

        if snapshot.last_error != self.last_error {
            self.last_error = snapshot.last_error.clone();
            if let Some(error) = &self.last_error {
                println!("error: {error}");
            }
        }

        if snapshot.display.feedback != self.last_feedback {
            self.last_feedback = snapshot.display.feedback.clone();
            if let Some(feedback) = &self.last_feedback {
                println!("feedback: {feedback}");
            }
        }

        if snapshot.display.rep_count != self.last_rep_count {
            self.last_rep_count = snapshot.display.rep_count;
            println!("reps: {}", self.last_rep_count);
        }

        if let (Some(dir), Some(jpeg)) = (&self.out_dir, &snapshot.display.frame_jpeg) {
            if self.last_frame.as_deref() != Some(jpeg.as_slice()) {
                let path = dir.join(format!("frame-{:06}.jpg", self.frames_written));
                std::fs::write(&path, jpeg)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                self.frames_written += 1;
                self.last_frame = Some(jpeg.clone());
            }
        }
        Ok(())
    }

    fn audio(&mut self, clip: &[u8]) -> Result<()> {
        let Some(dir) = &self.out_dir else {
            return Ok(());
        };
        let path = dir.join(format!("feedback-{:03}.mp3", self.clips_written));
        std::fs::write(&path, clip)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.clips_written += 1;
        println!("audio: saved {}", path.display());
        Ok(())
    }
}
