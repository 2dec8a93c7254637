//! Terminal output for command results
//!
//! Human output marks outcomes with a symbol and indents detail lines. In
//! JSON mode stdout carries only the command's document, so it can be piped
//! into other tools; status messages go to stderr as one object per line and
//! detail lines are dropped.

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Success,
    Error,
    Warning,
    Detail,
}

#[derive(Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Writes messages and documents in the selected [`OutputFormat`]
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn success(&self, message: &str) {
        self.emit(Level::Success, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::Warning, message);
    }

    /// Indented detail line, human output only
    pub fn line(&self, message: &str) {
        self.emit(Level::Detail, message);
    }

    /// Prints `value` as the command's document, JSON output only
    pub fn json(&self, value: &serde_json::Value) {
        if !self.format.is_json() {
            return;
        }
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => self.error(&format!("Failed to render JSON output: {e}")),
        }
    }

    fn emit(&self, level: Level, message: &str) {
        match self.render(level, message) {
            Some((Stream::Stdout, text)) => println!("{text}"),
            Some((Stream::Stderr, text)) => eprintln!("{text}"),
            None => {}
        }
    }

    fn render(&self, level: Level, message: &str) -> Option<(Stream, String)> {
        use serde_json::json;

        let rendered = match (self.format, level) {
            (OutputFormat::Human, Level::Success) => (Stream::Stdout, format!("\u{2713} {message}")),
            (OutputFormat::Human, Level::Error) => (Stream::Stderr, format!("\u{2717} Error: {message}")),
            (OutputFormat::Human, Level::Warning) => {
                (Stream::Stderr, format!("\u{26a0} Warning: {message}"))
            }
            (OutputFormat::Human, Level::Detail) => (Stream::Stdout, format!("  {message}")),
            (OutputFormat::Json, Level::Success) => (
                Stream::Stderr,
                json!({"level": "success", "message": message}).to_string(),
            ),
            (OutputFormat::Json, Level::Error) => (
                Stream::Stderr,
                json!({"level": "error", "message": message}).to_string(),
            ),
            (OutputFormat::Json, Level::Warning) => (
                Stream::Stderr,
                json!({"level": "warning", "message": message}).to_string(),
            ),
            (OutputFormat::Json, Level::Detail) => return None,
        };
        Some(rendered)
    }
}

/// Formats a byte count with a binary unit, e.g. `1.5 MiB`
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `""` for one, `"s"` otherwise
pub fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
