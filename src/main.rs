use std::fs::{self, OpenOptions};
use std::io::stdout;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;

mod config;
mod services;
mod ui;
mod utils;

use config::Settings;
use ui::{app::App, theme::Theme, Term};

const LOG_FILE_NAME: &str = "filedeck.log";

fn print_help() {
    println!("filedeck {}", env!("CARGO_PKG_VERSION"));
    println!("Terminal file manager with batch text modification and undo");
    println!();
    println!("USAGE:");
    println!("    filedeck [PATH]");
    println!();
    println!("ARGS:");
    println!("    [PATH]    Directory to browse (default: start_path setting or home)");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
    println!();
    println!("Settings: ~/.filedeck/settings.json   Log: ~/.filedeck/{}", LOG_FILE_NAME);
}

/// Log to a file under the config dir; a TUI owns stdout and stderr
fn init_logging(settings: &Settings) {
    let Some(dir) = Settings::config_dir() else {
        return;
    };
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
    {
        Ok(file) => file,
        Err(_) => return,
    };

    let env = env_logger::Env::default().default_filter_or(settings.log_level.as_str());
    let _ = env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init();
}

fn init_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(ratatui::Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(terminal: &mut Term, app: &mut App) -> Result<()> {
    let theme = Theme::default();

    loop {
        terminal.draw(|frame| ui::draw(frame, app, &theme))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    ui::handle_key(app, key);
                }
            }
        }

        app.tick();

        if app.should_quit {
            return Ok(());
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut path_arg: Option<PathBuf> = None;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("filedeck {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown option: {}", other);
                eprintln!("Run 'filedeck --help' for usage");
                std::process::exit(2);
            }
            other => path_arg = Some(PathBuf::from(other)),
        }
    }

    let (settings, load_error) = Settings::load();
    init_logging(&settings);
    if let Some(e) = load_error {
        log::warn!("{}; using defaults", e);
    }

    let start = path_arg.unwrap_or_else(|| settings.start_path());
    log::info!("filedeck {} starting in {}", env!("CARGO_PKG_VERSION"), start.display());

    let mut app = App::new(settings, start);
    let mut terminal = init_terminal()?;

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run(&mut terminal, &mut app)
    }));

    // Always restore terminal
    restore_terminal(&mut terminal).ok();

    match result {
        Ok(outcome) => {
            app.save_settings();
            log::info!("filedeck exiting");
            outcome
        }
        Err(_) => {
            log::error!("filedeck panicked; terminal restored");
            eprintln!("filedeck crashed. See ~/.filedeck/{}", LOG_FILE_NAME);
            Ok(())
        }
    }
}
