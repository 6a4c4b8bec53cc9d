//! OS-level keyboard input using rdev
//!
//! Terminals rarely report auto-repeat or key releases. Listening at the OS
//! level gives both: the listener remembers which keys are held, so a second
//! press without a release in between is flagged as a repeat.
//!
//! rdev reports physical key positions. They are translated to characters in
//! the main thread with [`key_to_char`], so a layout switch takes effect on
//! the next key press.
//!
//! The listener sees keys typed into every window. [`FocusTracker`] only lets
//! its presses through while the terminal reports that it has focus.

use crate::error::{Error, Result};
use crate::keyboard::KeyboardLayout;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use rdev::{listen, Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A key press seen by the OS-level listener
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OsKeyPress {
    pub key: Key,
    /// Set while the key was already held (auto-repeat)
    pub repeat: bool,
}

/// Physical keys currently held down
#[derive(Debug, Default, Clone)]
pub struct HeldKeys {
    keys: Vec<Key>,
}

impl HeldKeys {
    /// Record a press; returns true if the key was already held (auto-repeat)
    pub fn press(&mut self, key: Key) -> bool {
        if self.keys.contains(&key) {
            true
        } else {
            self.keys.push(key);
            false
        }
    }

    /// Record a release
    pub fn release(&mut self, key: Key) {
        self.keys.retain(|k| *k != key);
    }
}

/// Tracks whether OS-level key presses belong to this terminal
///
/// Terminals that never report focus changes give no way to tell our window
/// from any other, so OS presses are only trusted once a focus report has
/// arrived. Until then note keys come from terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTracker {
    reported: bool,
    focused: bool,
}

impl Default for FocusTracker {
    fn default() -> Self {
        Self {
            reported: false,
            focused: true,
        }
    }
}

impl FocusTracker {
    pub fn focus_gained(&mut self) {
        self.reported = true;
        self.focused = true;
    }

    pub fn focus_lost(&mut self) {
        self.reported = true;
        self.focused = false;
    }

    /// A terminal key event arrived, so the terminal has focus
    pub fn key_seen(&mut self) {
        self.focused = true;
    }

    /// Whether note keys should be read from the OS listener instead of the terminal
    pub fn uses_os_keys(&self, listener_running: bool) -> bool {
        listener_running && self.reported
    }

    /// Whether an OS press should be played right now
    pub fn accepts_os_keys(&self, listener_running: bool) -> bool {
        self.uses_os_keys(listener_running) && self.focused
    }
}

/// OS-level keyboard listener that captures key presses
pub struct OsKeyboardListener {
    /// Channel receiver for key presses
    event_rx: Receiver<OsKeyPress>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
    /// Listener thread handle
    _thread: JoinHandle<()>,
}

impl OsKeyboardListener {
    /// Start the OS keyboard listener
    ///
    /// Returns None if the listener couldn't be started (e.g., on systems without X11)
    pub fn new() -> Option<Self> {
        if !is_available() {
            return None;
        }

        let listener = Self::spawn(run_listener);

        // Give the thread a moment to start
        thread::sleep(std::time::Duration::from_millis(100));

        Some(listener)
    }

    /// Run `run` on its own thread, feeding the returned listener
    fn spawn<F>(run: F) -> Self
    where
        F: FnOnce(Sender<OsKeyPress>, Arc<AtomicBool>) + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let thread = thread::spawn(move || {
            run(tx, shutdown_clone);
        });

        Self {
            event_rx: rx,
            shutdown,
            _thread: thread,
        }
    }

    /// Try to receive a key press (non-blocking)
    ///
    /// Fails with [`Error::KeyListenerStopped`] once the listener thread has
    /// exited and every pending press was drained.
    pub fn try_recv(&self) -> Result<Option<OsKeyPress>> {
        match self.event_rx.try_recv() {
            Ok(press) => Ok(Some(press)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::KeyListenerStopped),
        }
    }
}

impl Drop for OsKeyboardListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Map a physical key to the character it carries in `layout`
///
/// Only keys bound to notes or to the quit action are translated. On QWERTZ
/// keyboards the Y and Z keys trade places with their US positions.
pub fn key_to_char(key: Key, layout: KeyboardLayout) -> Option<char> {
    match (key, layout) {
        (Key::KeyY, KeyboardLayout::Qwerty) => Some('y'),
        (Key::KeyY, KeyboardLayout::Qwertz) => Some('z'),
        (Key::KeyZ, KeyboardLayout::Qwerty) => Some('z'),
        (Key::KeyZ, KeyboardLayout::Qwertz) => Some('y'),
        (key, _) => shared_key_char(key),
    }
}

fn shared_key_char(key: Key) -> Option<char> {
    match key {
        // White keys by digit
        Key::Num1 => Some('1'),
        Key::Num2 => Some('2'),
        Key::Num3 => Some('3'),
        Key::Num4 => Some('4'),
        Key::Num5 => Some('5'),
        Key::Num6 => Some('6'),
        Key::Num7 => Some('7'),
        Key::Num8 => Some('8'),
        Key::Num9 => Some('9'),
        Key::Num0 => Some('0'),

        // White keys on the home row (A S D F G H J K L ;)
        Key::KeyA => Some('a'),
        Key::KeyS => Some('s'),
        Key::KeyD => Some('d'),
        Key::KeyF => Some('f'),
        Key::KeyG => Some('g'),
        Key::KeyH => Some('h'),
        Key::KeyJ => Some('j'),
        Key::KeyK => Some('k'),
        Key::KeyL => Some('l'),
        Key::SemiColon => Some(';'),

        // Black keys on the upper row (W E T Y/Z U O P)
        Key::KeyW => Some('w'),
        Key::KeyE => Some('e'),
        Key::KeyT => Some('t'),
        Key::KeyU => Some('u'),
        Key::KeyO => Some('o'),
        Key::KeyP => Some('p'),

        Key::Escape => Some('\x1b'),

        _ => None,
    }
}

/// Run the rdev listener (blocking - runs in its own thread)
///
/// Returning drops `tx`, which is how the main thread learns the listener
/// stopped.
fn run_listener(tx: Sender<OsKeyPress>, shutdown: Arc<AtomicBool>) {
    let mut held = HeldKeys::default();
    let callback = move |event: Event| {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }

        match event.event_type {
            EventType::KeyPress(key) => {
                let repeat = held.press(key);
                let _ = tx.send(OsKeyPress { key, repeat });
            }
            EventType::KeyRelease(key) => held.release(key),
            _ => {}
        }
    };

    // This blocks until an error occurs
    if let Err(e) = listen(callback) {
        log::warn!("OS keyboard listener stopped: {:?}", e);
    }
}

/// Check if the OS keyboard listener is likely to work on this system
pub fn is_available() -> bool {
    // On Linux, rdev requires X11 or Wayland
    #[cfg(target_os = "linux")]
    {
        std::env::var("DISPLAY").is_ok() || std::env::var("WAYLAND_DISPLAY").is_ok()
    }

    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}
