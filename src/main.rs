use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event},
    execute,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc;

use tonearm::device::MediaBackend;
use tonearm::device::rodio::RodioBackend;
use tonearm::device::sim::SimulatedBackend;
use tonearm::input::{self, Command, VOLUME_STEP};
use tonearm::logging;
use tonearm::lyrics::FileLyricsSource;
use tonearm::player::{Player, PlayerSnapshot};
use tonearm::storage::FileStore;
use tonearm::track::Track;

const STATE_DIR: &str = ".tonearm";
const SIM_CLOCK_TICK: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== tonearm starting ===");

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    // Prefer the real output device; without one (headless CI, containers)
    // the simulated device keeps the transport functional.
    let backend: Box<dyn MediaBackend> = match RodioBackend::new(events_tx.clone()) {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            tracing::warn!(error = %e, "No audio output, using simulated device");
            let sim = SimulatedBackend::new(events_tx);
            sim.start_clock(SIM_CLOCK_TICK);
            Box::new(sim)
        }
    };

    let store = Arc::new(FileStore::new(STATE_DIR)?);
    let player = Player::new(backend, events_rx, store, Arc::new(FileLyricsSource));

    player.restore().await;

    // File paths on the command line replace the restored queue.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        player.clear_queue().await;
        for arg in &args {
            player.add_track(track_from_path(arg)).await;
        }
        tracing::info!(count = args.len(), "Enqueued tracks from command line");
    }

    enable_raw_mode()?;
    let result = run(&player).await;
    disable_raw_mode()?;
    println!();

    player.dispose().await;

    if let Err(ref e) = result {
        tracing::error!(error = ?e, "Application error");
    }
    tracing::info!("tonearm shutting down");
    result
}

async fn run(player: &Player) -> Result<()> {
    let mut stdout = io::stdout();
    loop {
        let snapshot = player.snapshot().await;
        execute!(
            stdout,
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine)
        )?;
        write!(stdout, "{}", status_line(&snapshot))?;
        stdout.flush()?;

        // Short poll keeps the status line fresh between key presses.
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                let Some(command) = input::map_key(key) else {
                    continue;
                };
                match command {
                    Command::TogglePlay => player.toggle().await,
                    Command::NextTrack => player.next().await,
                    Command::PrevTrack => player.previous().await,
                    Command::VolumeUp => player.step_volume(VOLUME_STEP).await,
                    Command::VolumeDown => player.step_volume(-VOLUME_STEP).await,
                    Command::CycleMode => {
                        player.cycle_play_mode().await;
                    }
                    Command::Quit => break,
                }
            }
        }
    }
    Ok(())
}

fn track_from_path(path: &str) -> Track {
    let mut track = Track::new(path, path);
    track.title = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    track
}

fn status_line(snapshot: &PlayerSnapshot) -> String {
    let marker = if snapshot.is_playing { ">" } else { "#" };
    let title = snapshot
        .track
        .as_ref()
        .map(|t| t.display_title().to_string())
        .unwrap_or_else(|| "(queue empty)".to_string());
    let duration = snapshot
        .duration
        .map(format_time)
        .unwrap_or_else(|| "--:--".to_string());

    let mut line = format!(
        "{marker} {title}  {}/{duration}  [{}] vol {:.0}%",
        format_time(snapshot.position),
        snapshot.play_mode.label(),
        snapshot.volume * 100.0
    );
    if let Some(lyric) = &snapshot.lyric_line {
        line.push_str("  | ");
        line.push_str(lyric);
    }
    if let Some(notice) = &snapshot.notice {
        line.push_str("  ! ");
        line.push_str(notice);
    }
    line
}

fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
