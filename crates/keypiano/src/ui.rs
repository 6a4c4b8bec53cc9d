//! TUI rendering for the virtual piano
//!
//! The piano is drawn from a [`PianoLayout`], which is also what mouse clicks
//! are hit-tested against, so a click always lands on the key that is drawn
//! under the cursor.

use crate::config::Theme;
use crate::keyboard::VirtualKeyboard;
use crate::notes::{Note, PIANO_KEYS};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Columns per white key, including the separator on its left edge
pub const KEY_WIDTH: u16 = 6;

const BLACK_KEY_WIDTH: u16 = 3;
const PIANO_WIDTH: u16 = KEY_WIDTH * PIANO_KEYS.len() as u16;

/// Black key label row, white key label row, white key note row
const MIN_KEY_ROWS: u16 = 3;

/// Session details shown around the keyboard
#[derive(Debug, Default, Clone, Copy)]
pub struct Status<'a> {
    /// Name of the open audio output
    pub output: Option<&'a str>,
    /// Whether key events come from the OS listener
    pub os_keyboard_active: bool,
    /// Last trigger failure
    pub error: Option<&'a str>,
}

/// Screen placement of the piano
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PianoLayout {
    /// Outer bordered block
    pub frame: Rect,
    /// Region covered by the keys
    pub keys: Rect,
    /// Status line below the keys
    pub status: Rect,
    /// Rows from the top of `keys` where black keys sit
    pub black_rows: u16,
}

impl PianoLayout {
    /// Place the piano inside `area`, or None if it does not fit
    pub fn new(area: Rect) -> Option<Self> {
        let margin = 1u16;
        let width = (PIANO_WIDTH + 4).min(area.width.saturating_sub(margin * 2));
        let height = area.height.saturating_sub(margin * 2);
        if width < PIANO_WIDTH + 2 || height < MIN_KEY_ROWS + 3 {
            return None;
        }

        let frame = Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + margin,
            width,
            height,
        };
        let inner = Rect {
            x: frame.x + 1,
            y: frame.y + 1,
            width: frame.width - 2,
            height: frame.height - 2,
        };

        // One row for the status line, the rest for keys
        let key_rows = inner.height - 1;
        let keys = Rect {
            x: inner.x + (inner.width - PIANO_WIDTH) / 2,
            y: inner.y,
            width: PIANO_WIDTH,
            height: key_rows,
        };
        let status = Rect {
            x: inner.x,
            y: inner.y + key_rows,
            width: inner.width,
            height: 1,
        };

        // Black keys take about 40% of the extra height
        let extra = key_rows - MIN_KEY_ROWS;
        let black_rows = 1 + (extra * 2) / 5;

        Some(Self {
            frame,
            keys,
            status,
            black_rows,
        })
    }

    /// Screen cells of the white key at `index`
    pub fn white_key_rect(&self, index: usize) -> Rect {
        Rect {
            x: self.keys.x + index as u16 * KEY_WIDTH,
            y: self.keys.y,
            width: KEY_WIDTH,
            height: self.keys.height,
        }
    }

    /// Screen cells of the black key right of the white key at `index`
    pub fn black_key_rect(&self, index: usize) -> Rect {
        Rect {
            x: self.keys.x + (index as u16 + 1) * KEY_WIDTH - 1,
            y: self.keys.y,
            width: BLACK_KEY_WIDTH,
            height: self.black_rows,
        }
    }

    /// The note drawn at a screen cell
    ///
    /// Black keys sit on top of white keys but are only hit when the current
    /// mode shows them.
    pub fn key_at(&self, keyboard: &VirtualKeyboard, column: u16, row: u16) -> Option<Note> {
        let black = PIANO_KEYS.iter().enumerate().find_map(|(idx, key)| {
            key.black.filter(|note| {
                keyboard.mode().allows(*note) && contains(self.black_key_rect(idx), column, row)
            })
        });
        black.or_else(|| {
            PIANO_KEYS
                .iter()
                .enumerate()
                .find(|(idx, _)| contains(self.white_key_rect(*idx), column, row))
                .map(|(_, key)| key.white)
        })
    }
}

fn contains(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x && column < rect.x + rect.width && row >= rect.y && row < rect.y + rect.height
}

/// Find the note under a mouse click on a piano rendered into `area`
pub fn key_at(area: Rect, keyboard: &VirtualKeyboard, column: u16, row: u16) -> Option<Note> {
    PianoLayout::new(area)?.key_at(keyboard, column, row)
}

/// Render the piano using the available space
pub fn render_piano(
    frame: &mut Frame,
    area: Rect,
    keyboard: &VirtualKeyboard,
    status: &Status,
    theme: &Theme,
) {
    let Some(layout) = PianoLayout::new(area) else {
        let message = Paragraph::new("Terminal too small for the piano")
            .style(Style::default().fg(Color::Yellow));
        frame.render_widget(message, area);
        return;
    };

    let input_mode = if status.os_keyboard_active { "OS" } else { "Terminal" };
    let title = format!(
        " Piano [{} | {} | {}] ({}) -> {} ",
        keyboard.layout(),
        keyboard.mode(),
        keyboard.waveform().display_name(),
        input_mode,
        status.output.unwrap_or("audio idle"),
    );

    let mut block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border()));
    if theme.show_help {
        block = block.title_bottom(" Tab mode | F2 layout | F3 waveform | Esc quit ");
    }
    frame.render_widget(block, layout.frame);

    let lines: Vec<Line> = (0..layout.keys.height)
        .map(|row| key_row(&layout, keyboard, theme, row))
        .collect();
    frame.render_widget(Paragraph::new(lines), layout.keys);

    frame.render_widget(Paragraph::new(status_line(keyboard, status, theme)), layout.status);
}

/// What a row of the white key area shows
enum WhiteText {
    Blank,
    Bindings,
    NoteNames,
}

fn key_row(layout: &PianoLayout, keyboard: &VirtualKeyboard, theme: &Theme, row: u16) -> Line<'static> {
    let keymap = keyboard.keymap();
    let white_text = if row + 2 == layout.keys.height {
        WhiteText::Bindings
    } else if row + 1 == layout.keys.height && theme.show_note_names {
        WhiteText::NoteNames
    } else {
        WhiteText::Blank
    };

    let mut chars: Vec<(char, Style)> = vec![(' ', Style::default()); PIANO_WIDTH as usize];
    let key_width = KEY_WIDTH as usize;
    let separator = Style::default().fg(Color::Black).bg(theme.white_key());

    for (idx, key) in PIANO_KEYS.iter().enumerate() {
        let style = if keyboard.is_note_active(key.white) {
            Style::default()
                .fg(Color::Black)
                .bg(theme.pressed_key())
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Black).bg(theme.white_key())
        };
        let start = idx * key_width;
        for cell in &mut chars[start..start + key_width] {
            *cell = (' ', style);
        }
        if idx > 0 {
            chars[start] = ('|', separator);
        }

        let text = match white_text {
            WhiteText::Blank => continue,
            WhiteText::Bindings => {
                let digit = keymap.digit_for(key.white).unwrap_or(' ');
                let letter = keymap.letter_for(key.white).unwrap_or(' ');
                format!("{} {}", digit, letter.to_ascii_uppercase())
            }
            WhiteText::NoteNames => key.white.token(),
        };
        put_text(&mut chars, start + 1, key_width - 1, &text, style);
    }

    if row < layout.black_rows {
        for (idx, key) in PIANO_KEYS.iter().enumerate() {
            let Some(note) = key.black.filter(|n| keyboard.mode().allows(*n)) else {
                continue;
            };
            let style = if keyboard.is_note_active(note) {
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Magenta)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray).bg(theme.black_key())
            };
            let text = match row {
                0 => keymap
                    .letter_for(note)
                    .map(|c| format!("[{}]", c.to_ascii_uppercase()))
                    .unwrap_or_default(),
                1 if theme.show_note_names => note.token(),
                _ => String::new(),
            };
            let start = (idx + 1) * key_width - 1;
            put_text(&mut chars, start, BLACK_KEY_WIDTH as usize, &text, style);
        }
    }

    Line::from(build_spans_from_chars(&chars))
}

/// Write `text` centered into `width` cells starting at `start`
fn put_text(chars: &mut [(char, Style)], start: usize, width: usize, text: &str, style: Style) {
    let text = format!("{:^width$}", text, width = width);
    for (cell, ch) in chars[start..].iter_mut().zip(text.chars().take(width)) {
        *cell = (ch, style);
    }
}

fn status_line(keyboard: &VirtualKeyboard, status: &Status, theme: &Theme) -> Line<'static> {
    let active = keyboard.active_notes();
    let playing = if active.is_empty() {
        "-".to_string()
    } else {
        active.iter().map(|n| n.label()).collect::<Vec<_>>().join(" ")
    };

    let mut spans = vec![
        Span::styled("Playing: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            playing,
            Style::default()
                .fg(theme.pressed_key())
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(error) = status.error {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("Audio error: {}", error),
            Style::default().fg(Color::Red),
        ));
    }
    Line::from(spans)
}

/// Convert a character buffer with styles into spans (grouping consecutive chars with same style)
fn build_spans_from_chars(chars: &[(char, Style)]) -> Vec<Span<'static>> {
    if chars.is_empty() {
        return vec![];
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current_style = chars[0].1;
    let mut buffer = String::new();

    for (ch, style) in chars {
        if *style == current_style {
            buffer.push(*ch);
        } else {
            if !buffer.is_empty() {
                spans.push(Span::styled(buffer.clone(), current_style));
                buffer.clear();
            }
            buffer.push(*ch);
            current_style = *style;
        }
    }

    if !buffer.is_empty() {
        spans.push(Span::styled(buffer, current_style));
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::PlayMode;
    use ratatui::backend::TestBackend;
    use std::time::Instant;

    fn note(token: &str) -> Note {
        token.parse().unwrap()
    }

    fn draw(keyboard: &VirtualKeyboard, status: &Status) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal
            .draw(|frame| render_piano(frame, frame.area(), keyboard, status, &Theme::default()))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_build_spans() {
        let chars = vec![
            ('a', Style::default().fg(Color::Red)),
            ('b', Style::default().fg(Color::Red)),
            ('c', Style::default().fg(Color::Blue)),
        ];
        let spans = build_spans_from_chars(&chars);
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_layout_needs_room() {
        assert!(PianoLayout::new(Rect::new(0, 0, 40, 20)).is_none());
        assert!(PianoLayout::new(Rect::new(0, 0, 80, 6)).is_none());

        let layout = PianoLayout::new(Rect::new(0, 0, 80, 20)).unwrap();
        assert_eq!(layout.keys.width, PIANO_WIDTH);
        assert!(layout.black_rows >= 1 && layout.black_rows < layout.keys.height);
        assert_eq!(layout.status.y, layout.keys.y + layout.keys.height);
    }

    #[test]
    fn test_click_on_white_keys() {
        let area = Rect::new(0, 0, 80, 20);
        let layout = PianoLayout::new(area).unwrap();
        let keyboard = VirtualKeyboard::default();
        let bottom = layout.keys.y + layout.keys.height - 1;

        assert_eq!(key_at(area, &keyboard, layout.keys.x + 2, bottom), Some(note("C")));
        assert_eq!(
            key_at(area, &keyboard, layout.keys.x + 9 * KEY_WIDTH + 2, bottom),
            Some(note("E2"))
        );
    }

    #[test]
    fn test_black_keys_only_hit_in_advanced_mode() {
        let area = Rect::new(0, 0, 80, 20);
        let layout = PianoLayout::new(area).unwrap();
        let mut keyboard = VirtualKeyboard::default();

        // Between C and D, on the black key row
        let (x, y) = (layout.keys.x + KEY_WIDTH, layout.keys.y);
        assert_eq!(keyboard.mode(), PlayMode::Simple);
        assert_eq!(key_at(area, &keyboard, x, y), Some(note("D")));

        keyboard.set_mode(PlayMode::Advanced);
        assert_eq!(key_at(area, &keyboard, x, y), Some(note("C#")));
        assert_eq!(
            key_at(area, &keyboard, x, layout.keys.y + layout.keys.height - 1),
            Some(note("D"))
        );

        // No black key between E and F
        let between_e_f = layout.keys.x + 3 * KEY_WIDTH;
        assert_eq!(key_at(area, &keyboard, between_e_f, y), Some(note("F")));
    }

    #[test]
    fn test_click_outside_keys() {
        let area = Rect::new(0, 0, 80, 20);
        let layout = PianoLayout::new(area).unwrap();
        let keyboard = VirtualKeyboard::default();

        assert_eq!(key_at(area, &keyboard, 0, 0), None);
        assert_eq!(key_at(area, &keyboard, layout.keys.x + 2, layout.status.y), None);
        assert_eq!(key_at(Rect::new(0, 0, 30, 10), &keyboard, 5, 5), None);
    }

    #[test]
    fn test_render_shows_black_keys_in_advanced_mode() {
        let mut keyboard = VirtualKeyboard::default();
        let simple = draw(&keyboard, &Status::default());
        assert!(simple.contains("Piano [qwerty | simple | Sine Wave]"));
        assert!(simple.contains("1 A"));
        assert!(!simple.contains("[W]"));

        keyboard.set_mode(PlayMode::Advanced);
        let advanced = draw(&keyboard, &Status::default());
        assert!(advanced.contains("[W]"));
        assert!(advanced.contains("[Y]"));
    }

    #[test]
    fn test_render_status_line() {
        let mut keyboard = VirtualKeyboard::default();
        keyboard.activate(note("E"), Instant::now());
        let status = Status {
            output: Some("default"),
            os_keyboard_active: false,
            error: Some("no output device"),
        };
        let screen = draw(&keyboard, &status);
        assert!(screen.contains("Playing: E"));
        assert!(screen.contains("Audio error: no output device"));
        assert!(screen.contains("-> default"));
    }
}
