//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the REPL can
//! print with or without ANSI styling.

use std::io::{self, Stdout, Write};

/// ANSI escape code for bold text (used for headings and prompts).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for timestamps and notes).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for values and user messages).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for headings and warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for the assistant and successes).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Called before the first chunk of a reply.
    fn start_response(&mut self);

    /// Print a chunk of response text.
    ///
    /// This is called incrementally as chunks arrive.
    fn print_text(&mut self, text: &str);

    /// Called when a response is complete.
    fn finish_response(&mut self);

    /// Called when the user abandons a streamed reply.
    fn print_interrupted(&mut self);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print a warning.
    fn print_warning(&mut self, warning: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a confirmation.
    fn print_success(&mut self, message: &str);

    /// Print a section heading.
    fn print_heading(&mut self, heading: &str);

    /// Print an indented `key: value` line.
    fn print_field(&mut self, key: &str, value: &str);

    /// Print one stored message as a single line.
    fn print_message_line(&mut self, time: &str, role: &str, text: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Wrap `text` in `style` when colors are on.
    pub fn paint(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    /// The styled `You: ` prompt.
    pub fn prompt(&self) -> String {
        if self.use_color {
            format!("{ANSI_CYAN}{ANSI_BOLD}You:{ANSI_RESET} ")
        } else {
            "You: ".to_string()
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self) {
        print!("\n{} ", self.paint(ANSI_GREEN, "Assistant:"));
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn finish_response(&mut self) {
        println!("\n");
        self.flush();
    }

    fn print_interrupted(&mut self) {
        println!("\n{}\n", self.paint(ANSI_YELLOW, "[interrupted]"));
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        eprintln!("{}", self.paint(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_warning(&mut self, warning: &str) {
        println!("{}", self.paint(ANSI_YELLOW, warning));
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
    }

    fn print_success(&mut self, message: &str) {
        println!("{}", self.paint(ANSI_GREEN, message));
    }

    fn print_heading(&mut self, heading: &str) {
        println!("\n{}", self.paint(ANSI_YELLOW, heading));
    }

    fn print_field(&mut self, key: &str, value: &str) {
        println!("   {key}: {}", self.paint(ANSI_CYAN, value));
    }

    fn print_message_line(&mut self, time: &str, role: &str, text: &str) {
        let color = if role == "user" { ANSI_CYAN } else { ANSI_GREEN };
        println!(
            "   {} {}: {text}",
            self.paint(ANSI_DIM, &format!("[{time}]")),
            self.paint(color, role)
        );
    }
}
