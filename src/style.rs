//! Terminal styling utilities
//!
//! Renders decoded log lines and bot listings for the CLI.
//! Uses crossterm for cross-platform terminal colors.

use crate::fleet::{BotId, BotState, LogLine, OutputStream};
use ansi_segments::{Color, Segment};
use crossterm::style::{StyledContent, Stylize};

/// Display color for a segment color; `None` keeps the terminal default
pub fn terminal_color(color: Color) -> Option<crossterm::style::Color> {
    use crossterm::style::Color as Term;

    match color {
        Color::Default => None,
        Color::Black => Some(Term::Black),
        Color::Red => Some(Term::Red),
        Color::Green => Some(Term::Green),
        Color::Amber => Some(Term::DarkYellow),
        Color::Blue => Some(Term::Blue),
        Color::Magenta => Some(Term::Magenta),
        Color::Cyan => Some(Term::Cyan),
    }
}

/// One segment in its color
pub fn segment(segment: &Segment) -> StyledContent<String> {
    let text = segment.text.clone();
    match terminal_color(segment.color) {
        Some(color) => text.with(color),
        None => text.stylize(),
    }
}

/// A whole log line, prefixed with the bot's label
pub fn log_line(label: &str, line: &LogLine) -> String {
    let mut out = format!("{} ", bot_label(label, line.stream));
    for s in &line.segments {
        out.push_str(&segment(s).to_string());
    }
    out
}

/// Bot label tinted by the stream the line came from
pub fn bot_label(label: &str, stream: OutputStream) -> StyledContent<String> {
    let label = format!("[{}]", label);
    match stream {
        OutputStream::Stdout => label.cyan(),
        OutputStream::Stderr => label.red(),
        OutputStream::Supervisor => label.dark_grey(),
    }
}

/// State colors
/// - idle: Dim grey
/// - running: Green
/// - stopping: Yellow
pub fn state_style(state: BotState) -> StyledContent<String> {
    let label = state.to_string();
    match state {
        BotState::Idle => label.dark_grey(),
        BotState::Running => label.green(),
        BotState::StoppingByRequest => label.yellow(),
    }
}

/// ID styling
pub fn bot_id(id: BotId) -> StyledContent<String> {
    id.to_string().cyan()
}

/// Section headers
pub fn header(text: &str) -> StyledContent<String> {
    text.to_string().bold()
}

/// Dim/muted text
pub fn dim(text: &str) -> StyledContent<String> {
    text.to_string().dark_grey()
}

/// Success text
pub fn success(text: &str) -> StyledContent<String> {
    text.to_string().green()
}

/// Warning text
pub fn warning(text: &str) -> StyledContent<String> {
    text.to_string().yellow()
}

/// Error text
pub fn error(text: &str) -> StyledContent<String> {
    text.to_string().red()
}

/// Path styling
pub fn path(p: &str) -> StyledContent<String> {
    p.to_string().blue()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_colors() {
        assert_eq!(terminal_color(Color::Default), None);
        assert_eq!(
            terminal_color(Color::Amber),
            Some(crossterm::style::Color::DarkYellow)
        );
        for color in Color::all() {
            if *color != Color::Default {
                assert!(terminal_color(*color).is_some());
            }
        }
    }

    #[test]
    fn test_segment_keeps_text() {
        let styled = segment(&Segment::new("ERROR", Color::Red));
        assert_eq!(styled.content(), "ERROR");
    }

    #[test]
    fn test_log_line_contains_text() {
        let line = LogLine::supervisor("[INFO] Bot process stopped by user.");
        let rendered = log_line("alpha", &line);
        assert!(rendered.contains("[alpha]"));
        assert!(rendered.contains("[INFO] Bot process stopped by user."));
    }

    #[test]
    fn test_state_colors() {
        let _ = state_style(BotState::Idle);
        let _ = state_style(BotState::Running);
        let _ = state_style(BotState::StoppingByRequest);
    }
}
