//! keypiano - Terminal virtual piano
//!
//! Play synthesized notes from your computer keyboard or by clicking the keys
//! drawn in the terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags, MouseButton,
        MouseEventKind, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Clear};
use std::io::{self, stdout};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use keypiano::{
    audio::list_output_devices,
    config::{Config, Theme},
    keyboard::{KeyboardLayout, PlayMode},
    notes::Note,
    os_keyboard::{key_to_char, FocusTracker, OsKeyboardListener},
    router::{InputEvent, InputRouter},
    synth::{ToneSynthesizer, Waveform, NOTE_DURATION},
    ui::{key_at, render_piano, Status},
};

#[derive(Parser)]
#[command(name = "keypiano")]
#[command(author, version, about = "Terminal virtual piano", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (default: ~/.config/keypiano/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keyboard layout: qwerty or qwertz
    #[arg(short, long)]
    layout: Option<KeyboardLayout>,

    /// Play mode: simple (white keys) or advanced (white and black keys)
    #[arg(short, long)]
    mode: Option<PlayMode>,

    /// Waveform: sine, square, sawtooth or triangle
    #[arg(short, long)]
    waveform: Option<Waveform>,

    /// Audio output device name (see list-devices)
    #[arg(short, long)]
    device: Option<String>,

    /// Do not open an audio device, only log the notes played
    #[arg(long)]
    mute: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init,
    /// Show the configuration file path
    ConfigPath,
    /// List available audio output devices
    ListDevices,
    /// Play a sequence of notes without the keyboard UI
    Play {
        /// Note tokens, e.g. C E G C2 or C#/Db
        #[arg(required = true)]
        notes: Vec<String>,

        /// Milliseconds between note starts
        #[arg(long, default_value = "400")]
        gap_ms: u64,
    },
}

/// Logger settings read from `filter_var`
///
/// Logging is off unless the variable is set, since stderr shares the
/// terminal with the piano UI.
fn log_env(filter_var: &str) -> env_logger::Env<'_> {
    env_logger::Env::default().filter_or(filter_var, "off")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(log_env(env_logger::DEFAULT_FILTER_ENV)).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            let path = Config::config_path()?;
            println!("{}", path.display());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            let devices = list_output_devices()?;
            if devices.is_empty() {
                println!("No audio output devices found");
            } else {
                println!("Available audio output devices:");
                for device in devices {
                    let rate = device
                        .default_sample_rate
                        .map(|r| format!("{} Hz", r))
                        .unwrap_or_else(|| "unknown rate".to_string());
                    let marker = if device.is_default { " (default)" } else { "" };
                    println!(
                        "  {}{} - {} channels, {}",
                        device.name, marker, device.max_channels, rate
                    );
                }
            }
            return Ok(());
        }
        _ => {}
    }

    // Load config
    let mut config = if let Some(path) = &cli.config {
        Config::load_from(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        Config::load_or_default()
    };

    // Apply CLI overrides
    if let Some(layout) = cli.layout {
        config.piano.layout = layout;
    }
    if let Some(mode) = cli.mode {
        config.piano.mode = mode;
    }
    if let Some(waveform) = cli.waveform {
        config.piano.waveform = waveform;
    }
    if cli.device.is_some() {
        config.audio.device = cli.device;
    }

    let synth = if cli.mute {
        ToneSynthesizer::muted()
    } else {
        ToneSynthesizer::with_device(config.audio.device.clone())
    };

    if let Some(Commands::Play { notes, gap_ms }) = cli.command {
        return play_sequence(synth, config.piano.waveform, &notes, Duration::from_millis(gap_ms));
    }

    run_tui(config, synth)
}

/// Trigger each token in turn, then let the last note ring out
fn play_sequence(
    mut synth: ToneSynthesizer,
    waveform: Waveform,
    tokens: &[String],
    gap: Duration,
) -> Result<()> {
    let notes = tokens
        .iter()
        .map(|t| t.parse::<Note>())
        .collect::<keypiano::Result<Vec<_>>>()?;

    for (idx, note) in notes.iter().enumerate() {
        synth.trigger(*note, waveform)?;
        println!("{:<8} {:>7.2} Hz", note.label(), note.frequency());
        if idx + 1 < notes.len() {
            thread::sleep(gap);
        }
    }
    thread::sleep(NOTE_DURATION);
    synth.close();
    Ok(())
}

fn run_tui(config: Config, synth: ToneSynthesizer) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange, EnableMouseCapture)?;

    // Report auto-repeat as its own event kind where the terminal supports it
    let enhanced = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut router = InputRouter::new(config.to_virtual_keyboard(), synth);

    // Create OS keyboard listener
    let mut os_keyboard = OsKeyboardListener::new();
    if os_keyboard.is_none() {
        log::info!("OS keyboard listener unavailable, using terminal key events");
    }

    // Main loop
    let result = run_event_loop(&mut terminal, &mut router, &mut os_keyboard, &config.theme);

    router.shutdown();

    // Cleanup
    disable_raw_mode()?;
    if enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange
    )?;

    result
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    router: &mut InputRouter,
    os_keyboard: &mut Option<OsKeyboardListener>,
    theme: &Theme,
) -> Result<()> {
    let mut focus = FocusTracker::default();

    loop {
        router.tick(Instant::now());

        // Draw
        let screen = terminal
            .draw(|frame| {
                let area = frame.area();

                frame.render_widget(Clear, area);
                let bg_block = Block::default().style(Style::default().bg(Color::Rgb(20, 20, 30)));
                frame.render_widget(bg_block, area);

                let status = Status {
                    output: router.synth().output_name(),
                    os_keyboard_active: focus.accepts_os_keys(os_keyboard.is_some()),
                    error: router.last_error(),
                };
                render_piano(frame, area, router.keyboard(), &status, theme);
            })?
            .area;

        // Process OS keyboard events only when focused, drain them otherwise
        let mut listener_stopped = false;
        if let Some(os_kb) = os_keyboard.as_ref() {
            let accepts = focus.accepts_os_keys(true);
            loop {
                let press = match os_kb.try_recv() {
                    Ok(Some(press)) => press,
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("{}, using terminal key events", e);
                        listener_stopped = true;
                        break;
                    }
                };
                if !accepts {
                    continue;
                }
                match key_to_char(press.key, router.keyboard().layout()) {
                    Some('\x1b') => return Ok(()),
                    Some(c) => play(
                        router,
                        InputEvent::KeyDown {
                            key: c,
                            repeat: press.repeat,
                        },
                    ),
                    None => {}
                }
            }
        }
        if listener_stopped {
            *os_keyboard = None;
        }

        // Poll for terminal events
        if !event::poll(Duration::from_millis(16))? {
            continue;
        }

        match event::read()? {
            Event::FocusGained => focus.focus_gained(),
            Event::FocusLost => {
                focus.focus_lost();
                router.keyboard_mut().release_all();
            }
            Event::Key(key) => {
                focus.key_seen();

                if key.kind == KeyEventKind::Release {
                    continue;
                }
                let repeat = key.kind == KeyEventKind::Repeat;

                match key.code {
                    KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(())
                    }
                    KeyCode::Tab if !repeat => {
                        let mode = router.keyboard_mut().toggle_mode();
                        log::info!("Play mode: {}", mode);
                    }
                    KeyCode::F(2) if !repeat => {
                        let layout = router.keyboard_mut().toggle_layout();
                        log::info!("Keyboard layout: {}", layout);
                    }
                    KeyCode::F(3) if !repeat => {
                        let waveform = router.keyboard_mut().cycle_waveform();
                        log::info!("Waveform: {}", waveform);
                    }
                    // Note keys come from the OS listener once focus is tracked
                    KeyCode::Char(c) if !focus.uses_os_keys(os_keyboard.is_some()) => {
                        play(router, InputEvent::KeyDown { key: c, repeat });
                    }
                    _ => {}
                }
            }
            Event::Mouse(mouse) => {
                if mouse.kind == MouseEventKind::Down(MouseButton::Left) {
                    if let Some(note) = key_at(screen, router.keyboard(), mouse.column, mouse.row) {
                        play(router, InputEvent::Pointer(note));
                    }
                }
            }
            _ => {}
        }
    }
}

fn play(router: &mut InputRouter, event: InputEvent) {
    match router.handle(event, Instant::now()) {
        Ok(Some(note)) => log::debug!("Played {} ({:.2} Hz)", note.label(), note.frequency()),
        Ok(None) => {}
        Err(e) => log::error!("Failed to play note: {}", e),
    }
}
