use paint_composer::error::{ComposerError, Result};
use paint_composer::query::QueryOptions;
use paint_composer::render::{ConsoleRenderer, NullRenderer, Renderer};
use paint_composer::session::{Session, ToggleControl};
use paint_composer::settings::Settings;
use paint_composer::sound::LogSoundBank;
use paint_composer::types::GameStatus;

use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "paint-composer")]
#[command(about = "Music composer sequencer with a walking-character playback engine")]
struct Cli {
    /// Settings JSON file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a score and play it in real time
    Play {
        /// Score files (.msq or JSON), joined in the order of the number in their names
        files: Vec<PathBuf>,

        /// Load from a query string instead (url=... or S=..&T=..&L=..&E=..&B=..)
        #[arg(long)]
        query: Option<String>,

        /// Host frame rate (Hz)
        #[arg(long)]
        fps: Option<u32>,

        /// Display magnification
        #[arg(long)]
        magnify: Option<u32>,

        /// Stop the host loop after this many seconds
        #[arg(long, default_value_t = 300.0)]
        max_seconds: f64,

        /// Draw the score window as ASCII in the terminal
        #[arg(long)]
        console: bool,

        /// Console refresh rate (Hz)
        #[arg(long, default_value_t = 10)]
        display_hz: u32,

        /// Start playing as soon as the score is loaded
        #[arg(long)]
        auto: bool,

        /// Read play/stop/restart/loop/tempo/quit commands from stdin
        #[arg(long)]
        interactive: bool,
    },

    /// Print the share query string for a score
    Share {
        files: Vec<PathBuf>,
    },

    /// Print a score as JSON
    ExportJson {
        files: Vec<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },
}

/// Commands typed on stdin while the host loop runs.
#[derive(Debug, Clone, PartialEq)]
enum HostCommand {
    Play,
    Stop,
    Restart,
    ToggleLoop,
    Tempo(f64),
    Quit,
}

impl HostCommand {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        match words.next()? {
            "play" | "p" => Some(HostCommand::Play),
            "stop" | "s" => Some(HostCommand::Stop),
            "restart" | "r" => Some(HostCommand::Restart),
            "loop" | "l" => Some(HostCommand::ToggleLoop),
            "tempo" | "t" => words.next()?.parse().ok().map(HostCommand::Tempo),
            "quit" | "q" => Some(HostCommand::Quit),
            _ => None,
        }
    }
}

/// Controls locked during playback. The headless host has no widgets, so
/// this only logs the transitions.
struct LoggedControl(&'static str);

impl ToggleControl for LoggedControl {
    fn activate(&mut self) {
        debug!("Control '{}' enabled", self.0);
    }

    fn deactivate(&mut self) {
        debug!("Control '{}' disabled", self.0);
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let settings = cli
        .settings
        .as_deref()
        .and_then(Settings::load)
        .unwrap_or_default();

    let result = match cli.command {
        Command::Play {
            files,
            query,
            fps,
            magnify,
            max_seconds,
            console,
            display_hz,
            auto,
            interactive,
        } => {
            let mut settings = settings;
            if let Some(fps) = fps {
                settings.fps = fps;
            }
            if let Some(m) = magnify {
                settings.magnify = m;
            }
            let opts = PlayOptions {
                query,
                max_seconds,
                console,
                display_hz,
                auto,
                interactive,
            };
            run_play(settings, &files, opts)
        }
        Command::Share { files } => {
            load_session(settings, &files).map(|s| println!("?{}", s.share_query()))
        }
        Command::ExportJson { files, pretty } => load_session(settings, &files)
            .and_then(|s| s.export_json(pretty))
            .map(|json| println!("{}", json)),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

struct PlayOptions {
    query: Option<String>,
    max_seconds: f64,
    console: bool,
    display_hz: u32,
    auto: bool,
    interactive: bool,
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<(String, String)>> {
    paths
        .iter()
        .map(|p| -> Result<(String, String)> {
            Ok((p.to_string_lossy().into_owned(), std::fs::read_to_string(p)?))
        })
        .collect()
}

/// `url` sources resolve to local paths for the headless host.
fn fetch_local(url: &str) -> Result<String> {
    std::fs::read_to_string(Path::new(url)).map_err(|e| ComposerError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn load_into<S, R>(session: &mut Session<S, R>, paths: &[PathBuf]) -> Result<()>
where
    S: paint_composer::sound::SoundBank,
    R: Renderer,
{
    if paths.is_empty() {
        return Ok(());
    }
    let mut files = read_files(paths)?;
    let failures = session.load_files(&mut files);
    if failures.len() == files.len() {
        if let Some((_, e)) = failures.into_iter().next() {
            return Err(e);
        }
    }
    Ok(())
}

fn load_session(settings: Settings, paths: &[PathBuf]) -> Result<Session<LogSoundBank, NullRenderer>> {
    let mut session = Session::new(settings, LogSoundBank::new(), NullRenderer);
    load_into(&mut session, paths)?;
    Ok(session)
}

fn spawn_stdin_reader(tx: Sender<HostCommand>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match HostCommand::parse(&line) {
                Some(cmd) => {
                    let quit = cmd == HostCommand::Quit;
                    if tx.send(cmd).is_err() || quit {
                        break;
                    }
                }
                None => warn!("Unknown command {:?} (play, stop, restart, loop, tempo <n>, quit)", line.trim()),
            }
        }
    })
}

fn run_play(settings: Settings, paths: &[PathBuf], opts: PlayOptions) -> Result<()> {
    let fps = settings.fps.max(1);
    let renderer: Box<dyn Renderer> = if opts.console {
        let every_nth = (fps / opts.display_hz.max(1)).max(1) as u64;
        Box::new(
            ConsoleRenderer::new(io::stdout())
                .with_every_nth(every_nth)
                .with_clear_screen(true),
        )
    } else {
        Box::new(NullRenderer)
    };

    info!("═══════════════════════════════════════════════");
    info!("  PAINT COMPOSER v{}", env!("CARGO_PKG_VERSION"));
    info!("  Frame rate: {} Hz, magnify {}", fps, settings.magnify);
    if opts.console { info!("  UI: Console ({} Hz)", opts.display_hz); }
    if opts.interactive { info!("  Input: stdin commands"); }
    info!("═══════════════════════════════════════════════");

    let frame_interval = Duration::from_secs_f64(settings.frame_interval_ms() / 1000.0);
    let mut session = Session::new(settings, LogSoundBank::new(), renderer)
        .with_control(LoggedControl("scroll"))
        .with_control(LoggedControl("clear"))
        .with_control(LoggedControl("song-select"));

    load_into(&mut session, paths)?;
    let mut started = false;
    if let Some(query) = &opts.query {
        started = session.load_from_query(&QueryOptions::parse(query), fetch_local)?;
    }
    if !started && (opts.auto || !opts.interactive) {
        started = session.play();
    }

    let (cmd_tx, cmd_rx) = bounded::<HostCommand>(16);
    if opts.interactive {
        spawn_stdin_reader(cmd_tx)?;
    }

    host_loop(&mut session, &cmd_rx, frame_interval, &opts, started);

    info!(
        "Done: {} notes played, {} voices cut",
        session.sound().notes_played(),
        session.sound().voices_cut()
    );
    Ok(())
}

/// Drive the session at the frame rate until playback returns to Edit (or
/// `quit` in interactive mode), or the time limit.
fn host_loop<R: Renderer>(
    session: &mut Session<LogSoundBank, R>,
    commands: &Receiver<HostCommand>,
    frame_interval: Duration,
    opts: &PlayOptions,
    mut played: bool,
) {
    let start = Instant::now();
    loop {
        while let Ok(cmd) = commands.try_recv() {
            debug!("Host command {:?}", cmd);
            match cmd {
                HostCommand::Play => played |= session.play(),
                HostCommand::Stop => {
                    session.stop();
                }
                HostCommand::Restart => played |= session.restart(),
                HostCommand::ToggleLoop => {
                    let looping = session.toggle_loop();
                    info!("Loop {}", if looping { "ON" } else { "OFF" });
                }
                HostCommand::Tempo(t) => session.set_tempo(t),
                HostCommand::Quit => return,
            }
        }

        let elapsed = start.elapsed();
        session.animate(elapsed.as_secs_f64() * 1000.0);

        if !opts.interactive && played && session.game_status() == GameStatus::Edit {
            return;
        }
        if elapsed.as_secs_f64() > opts.max_seconds {
            info!("Time limit of {}s reached", opts.max_seconds);
            return;
        }
        thread::sleep(frame_interval);
    }
}
