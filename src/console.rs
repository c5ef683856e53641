//! Terminal output for the CLI.
//!
//! Every action writes through a [`Console`] it is handed rather than printing directly, so
//! tests can capture what the user would have seen.

use colored::Colorize;
use parking_lot::Mutex;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;

use crate::markdown;

/// A cloneable handle to the terminal (or whatever stands in for it).
///
/// Clones share one writer, and each call writes and flushes while holding its lock, so
/// output from the spinner task and the main task never interleaves mid-line.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Console {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Console::new(io::stdout())
    }

    fn write(&self, text: &str) {
        let mut out = self.out.lock();
        // nothing sensible to do if the terminal has gone away
        out.write_all(text.as_bytes()).ok();
        out.flush().ok();
    }

    pub fn line(&self, text: impl Display) {
        self.write(&format!("{}\n", text));
    }

    pub fn blank(&self) {
        self.write("\n");
    }

    pub fn heading(&self, text: &str) {
        self.line(text.blue().bold());
    }

    pub fn success(&self, text: &str) {
        self.line(text.green().bold());
    }

    pub fn notice(&self, text: &str) {
        self.line(text.yellow().bold());
    }

    pub fn error(&self, text: impl Display) {
        self.line(text.to_string().red().bold());
    }

    /// Renders one fragment of generated text. Surrounding whitespace is dropped and
    /// fragments that are empty afterwards print nothing.
    pub fn fragment(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.line(markdown::render(text));
    }

    /// Draws a transient status line that the next `status` or `clear_status` overwrites.
    pub fn status(&self, text: impl Display) {
        self.write(&format!("\r{}", text));
    }

    pub fn clear_status(&self) {
        self.write("\r\x1b[2K");
    }
}
