//! Colored segment decoding for terminal output
//!
//! Turns a line of process output containing simple SGR color escapes
//! (`ESC [ <code> m`) into an ordered list of `(text, color)` segments that a
//! display sink can append without understanding escape sequences.
//!
//! # Example
//!
//! ```
//! use ansi_segments::{segment_line, Color, Segment};
//!
//! let (segments, carried) = segment_line("\x1b[31mERROR\x1b[0m ok", Color::Default);
//!
//! assert_eq!(
//!     segments,
//!     vec![
//!         Segment::new("ERROR", Color::Red),
//!         Segment::new(" ok", Color::Default),
//!     ]
//! );
//! assert_eq!(carried, Color::Default);
//! ```
//!
//! Only the single-parameter form is recognized. Anything else that starts
//! with an escape byte is left in the text untouched.

use serde::{Deserialize, Serialize};

const ESC: u8 = 0x1B;

/// Foreground color of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// The display's default foreground
    #[default]
    Default,
    Black,
    Red,
    Green,
    /// Warnings (SGR 33)
    Amber,
    Blue,
    Magenta,
    Cyan,
}

impl Color {
    /// Map an SGR code to the color it selects.
    ///
    /// Returns `None` for codes that do not affect the foreground; callers keep
    /// their current color in that case.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 | 37 => Some(Self::Default),
            30 => Some(Self::Black),
            31 => Some(Self::Red),
            32 => Some(Self::Green),
            33 => Some(Self::Amber),
            34 => Some(Self::Blue),
            35 => Some(Self::Magenta),
            36 => Some(Self::Cyan),
            _ => None,
        }
    }

    /// All colors, in SGR order with `Default` first
    pub fn all() -> &'static [Color] {
        &[
            Color::Default,
            Color::Black,
            Color::Red,
            Color::Green,
            Color::Amber,
            Color::Blue,
            Color::Magenta,
            Color::Cyan,
        ]
    }

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Black => "black",
            Self::Red => "red",
            Self::Green => "green",
            Self::Amber => "amber",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A run of visible text drawn in a single color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub color: Color,
}

impl Segment {
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Split one line into colored segments.
///
/// `current` is the color carried over from the previous line of the same
/// stream. The second element of the result is the color to carry into the
/// next call. Empty runs between adjacent escapes produce no segment.
pub fn segment_line(line: &str, current: Color) -> (Vec<Segment>, Color) {
    let bytes = line.as_bytes();
    let mut segments = Vec::new();
    let mut color = current;
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == ESC {
            if let Some((code, end)) = match_sgr(bytes, i) {
                if i > text_start {
                    segments.push(Segment::new(&line[text_start..i], color));
                }
                if let Some(next) = code.and_then(Color::from_code) {
                    color = next;
                }
                i = end;
                text_start = end;
                continue;
            }
        }
        i += 1;
    }

    if text_start < bytes.len() {
        segments.push(Segment::new(&line[text_start..], color));
    }

    (segments, color)
}

/// Remove recognized color escapes, keeping everything else.
pub fn strip(line: &str) -> String {
    let (segments, _) = segment_line(line, Color::Default);
    segments.into_iter().map(|s| s.text).collect()
}

/// Match `ESC [ digits m` starting at `start`.
///
/// Returns the parsed code (`None` if it does not fit in a `u32`) and the
/// index just past the terminator. All matched bytes are ASCII, so both
/// `start` and the returned index are char boundaries.
fn match_sgr(bytes: &[u8], start: usize) -> Option<(Option<u32>, usize)> {
    if bytes.get(start + 1) != Some(&b'[') {
        return None;
    }

    let digits_start = start + 2;
    let mut end = digits_start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    if end == digits_start || bytes.get(end) != Some(&b'm') {
        return None;
    }

    let code = std::str::from_utf8(&bytes[digits_start..end])
        .ok()
        .and_then(|digits| digits.parse().ok());

    Some((code, end + 1))
}

/// Stateful wrapper that carries the current color between lines
///
/// One segmenter per output stream; lines must be fed in stream order.
#[derive(Debug, Clone, Default)]
pub struct AnsiSegmenter {
    current: Color,
}

impl AnsiSegmenter {
    /// Create a segmenter starting at the default color
    pub fn new() -> Self {
        Self::default()
    }

    /// Color that will apply to the start of the next line
    pub fn current(&self) -> Color {
        self.current
    }

    /// Decode one line and advance the carried color
    pub fn feed(&mut self, line: &str) -> Vec<Segment> {
        let (segments, next) = segment_line(line, self.current);
        self.current = next;
        segments
    }

    /// Forget the carried color
    pub fn reset(&mut self) {
        self.current = Color::Default;
    }
}
