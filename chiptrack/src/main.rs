use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chiptrack::compose;
use chiptrack::middle::Middle;
use chiptrack::pipeline::persistence;
use chiptrack::pipeline::project::ProjectState;
use chiptrack::shared::InputEvent;
use chiptrack::tui;

struct Args {
    project_dir: PathBuf,
    compose: Option<PathBuf>, // saved model response to turn into a song
    clips: Option<PathBuf>,   // saved model response with clip ideas
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn parse_args() -> anyhow::Result<Args> {
    let mut project_dir = None;
    let mut compose = None;
    let mut clips = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--compose" => compose = Some(args.next().context("--compose needs a file")?.into()),
            "--clips" => clips = Some(args.next().context("--clips needs a file")?.into()),
            _ if project_dir.is_none() => project_dir = Some(PathBuf::from(arg)),
            _ => anyhow::bail!("unexpected argument {arg:?}"),
        }
    }
    let project_dir = match project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("no current directory")?,
    };
    Ok(Args { project_dir, compose, clips })
}

// logs go to a file so they don't tear up the terminal
fn init_logging(project_dir: &Path) -> anyhow::Result<()> {
    let dir = project_dir.join(persistence::CHIPTRACK_DIR);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let log_path = dir.join("chiptrack.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let filter = EnvFilter::try_from_env("CHIPTRACK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn import_responses(args: &Args, project: &mut ProjectState) -> anyhow::Result<()> {
    if let Some(path) = &args.compose {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let composition = compose::compose_from_text(&text).with_context(|| format!("composing from {}", path.display()))?;
        info!(patterns = composition.patterns.len(), bpm = composition.bpm, "composition imported");
        project.apply_composition(composition);
    }
    if let Some(path) = &args.clips {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let clips = compose::clips_from_response(&text).with_context(|| format!("reading clips from {}", path.display()))?;
        info!(clips = clips.len(), "clips imported");
        project.add_custom_clips(clips);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_logging(&args.project_dir)?;
    info!(dir = %args.project_dir.display(), "chiptrack starting");

    let mut project = persistence::load_project(&args.project_dir).unwrap_or_else(|| {
        info!("no saved project, starting fresh");
        ProjectState::new_project()
    });
    import_responses(&args, &mut project)?;
    let mut middle = Middle::with_project(project);

    terminal::enable_raw_mode()?;
    // keyboard enhancement gives real press/release kinds; ignored if unsupported
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PushKeyboardEnhancementFlags(
            crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
        )
    );
    let _guard = RawModeGuard; // auto drops when out of scope

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let tick_rate = Duration::from_millis(16); // ~60fps
    let blink_start = Instant::now();
    let mut tui_state = tui::mode::TuiState::default();

    loop {
        let blink_on = (blink_start.elapsed().as_millis() / 250) % 2 == 0;
        middle.tick();
        middle.poll_meters();
        let ds = middle.display_state();
        tui_state.playing = ds.playing;

        term.draw(|frame| {
            let area = frame.area();
            tui::view::render(frame, area, &ds, &tui_state, blink_on);
        })?;

        for event in tui::input::poll_input(tick_rate, &mut tui_state)? {
            if event == InputEvent::Quit {
                middle.shutdown();
                if let Err(e) = persistence::save_project(&args.project_dir, &middle.project) {
                    error!(error = %e, "saving project failed");
                    warn!("quitting without a saved project");
                }
                info!("chiptrack exiting");
                return Ok(());
            }
            middle.handle_input(event);
        }
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PopKeyboardEnhancementFlags
        );
        let _ = terminal::disable_raw_mode();
    }
}
