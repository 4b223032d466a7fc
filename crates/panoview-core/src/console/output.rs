//! Colored console text: ANSI splitting, the replay buffer and emission.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::registry::CONSOLE_OUTPUT;
use crate::transport::Outbound;

/// Colors the frontend console understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleColor {
    White,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
}

impl ConsoleColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::BrightRed => "bright-red",
            Self::BrightGreen => "bright-green",
            Self::BrightYellow => "bright-yellow",
            Self::BrightBlue => "bright-blue",
            Self::BrightMagenta => "bright-magenta",
        }
    }

    /// SGR foreground code.
    fn sgr(self) -> u8 {
        match self {
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
            Self::White => 37,
            Self::BrightRed => 91,
            Self::BrightGreen => 92,
            Self::BrightYellow => 93,
            Self::BrightBlue => 94,
            Self::BrightMagenta => 95,
        }
    }

    fn from_sgr(code: u8) -> Option<Self> {
        Some(match code {
            31 => Self::Red,
            32 => Self::Green,
            33 => Self::Yellow,
            34 => Self::Blue,
            35 => Self::Magenta,
            37 | 97 => Self::White,
            91 => Self::BrightRed,
            92 => Self::BrightGreen,
            93 => Self::BrightYellow,
            94 => Self::BrightBlue,
            95 => Self::BrightMagenta,
            _ => return None,
        })
    }
}

impl fmt::Display for ConsoleColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConsoleColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::White,
            Self::Red,
            Self::Green,
            Self::Yellow,
            Self::Blue,
            Self::Magenta,
            Self::BrightRed,
            Self::BrightGreen,
            Self::BrightYellow,
            Self::BrightBlue,
            Self::BrightMagenta,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or_else(|| format!("unknown console color: {s}"))
    }
}

/// One run of same-colored console text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub color: Option<ConsoleColor>,
}

impl Segment {
    pub fn new(text: impl Into<String>, color: Option<ConsoleColor>) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

// ─── ANSI splitting ──────────────────────────────────────────────────

/// Split `text` on ANSI SGR escapes (`ESC [ ... m`) into colored segments.
///
/// Unknown codes reset to the default color. Other escape sequences are
/// passed through as text.
pub fn split_text_to_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut color = None;
    let mut current = String::new();
    let mut rest = text;

    while let Some(start) = rest.find("\x1b[") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('m') else {
            break;
        };
        let params = &after[..end];
        if !params.chars().all(|c| c.is_ascii_digit() || c == ';') {
            current.push_str(&rest[..start + 2]);
            rest = after;
            continue;
        }

        current.push_str(&rest[..start]);
        let next = apply_sgr(color, params);
        if next != color && !current.is_empty() {
            segments.push(Segment::new(std::mem::take(&mut current), color));
        }
        color = next;
        rest = &after[end + 1..];
    }
    current.push_str(rest);
    if !current.is_empty() {
        segments.push(Segment::new(current, color));
    }
    segments
}

fn apply_sgr(mut color: Option<ConsoleColor>, params: &str) -> Option<ConsoleColor> {
    if params.is_empty() {
        return None;
    }
    for code in params.split(';') {
        match code.parse::<u8>() {
            Ok(0 | 39) => color = None,
            Ok(n @ (30..=37 | 90..=97)) => color = ConsoleColor::from_sgr(n),
            // bold, underline and other attributes keep the color
            Ok(_) | Err(_) => {}
        }
    }
    color
}

/// Re-encode segments as ANSI text, the inverse of [`split_text_to_segments`].
pub fn segments_to_ansi(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment.color {
            Some(color) => {
                out.push_str(&format!("\x1b[{}m{}\x1b[0m", color.sgr(), segment.text));
            }
            None => out.push_str(&segment.text),
        }
    }
    out
}

// ─── Buffer & emitter ────────────────────────────────────────────────

/// Append-only log of everything the console has streamed, ANSI-encoded.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    text: Mutex<String>,
}

impl ConsoleBuffer {
    pub fn append(&self, text: &str) {
        self.text.lock().push_str(text);
    }

    pub fn snapshot(&self) -> String {
        self.text.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.text.lock().is_empty()
    }
}

/// Streams console text to the frontend and records it for replay.
#[derive(Debug)]
pub struct ConsoleOutput {
    outbound: Outbound,
    buffer: ConsoleBuffer,
}

impl ConsoleOutput {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            buffer: ConsoleBuffer::default(),
        }
    }

    /// Emit `text`, filling `color` into every segment that has none.
    pub fn emit_text(&self, text: &str, color: Option<ConsoleColor>) {
        if text.is_empty() {
            return;
        }
        let mut segments = split_text_to_segments(text);
        if color.is_some() {
            for segment in segments.iter_mut().filter(|s| s.color.is_none()) {
                segment.color = color;
            }
        }
        self.emit_segments(segments);
    }

    /// Emit prepared segments as one `console_output` message.
    pub fn emit_segments(&self, segments: Vec<Segment>) {
        if segments.is_empty() {
            return;
        }
        self.buffer.append(&segments_to_ansi(&segments));
        self.outbound
            .emit_or_log(CONSOLE_OUTPUT, serde_json::json!({ "segments": segments }));
    }

    pub fn history(&self) -> String {
        self.buffer.snapshot()
    }
}
