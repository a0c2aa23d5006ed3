//! Terminal styling helpers

/// ANSI styles used by the step printer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Bold,
    Dim,
    Strike,
    Red,
    Green,
    Yellow,
    Magenta,
    Cyan,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "90",
            Style::Strike => "9",
            Style::Red => "31",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Magenta => "35",
            Style::Cyan => "36",
        }
    }
}

/// Wrap `text` in an ANSI style
pub fn paint(style: Style, text: &str) -> String {
    format!("\x1b[{}m{}\x1b[0m", style.code(), text)
}

/// Format a URL as a clickable terminal hyperlink if supported.
///
/// Uses OSC 8 escape sequences where the terminal understands them and
/// falls back to plain colored text.
pub fn terminal_link(url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        format!("\x1b]8;;{}\x07{}\x1b]8;;\x07", url, paint(Style::Cyan, url))
    } else {
        paint(Style::Cyan, url)
    }
}
