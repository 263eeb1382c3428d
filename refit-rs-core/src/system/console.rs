//! User-visible message output.
//!
//! Launch and legacy boot failures are shown to the user in text mode, and every message must be acknowledged
//! with a key press before the menu comes back. [`Console`] is the small surface those components need; frontends
//! provide the rest of the UI on top of it.

use core::fmt::Write;

use uefi::{
    boot,
    proto::console::text::Color,
    system::{with_stdin, with_stdout},
};

/// Text output that the core uses to report launch problems.
pub trait Console {
    /// Switches to a plain text screen with a title bar, if not already in one.
    fn begin_text_screen(&mut self, title: &str);

    /// Prints a line of text.
    fn print_line(&mut self, text: &str);

    /// Prints an error line, highlighted if the console supports it.
    fn print_error(&mut self, text: &str) {
        self.print_line(text);
    }

    /// Waits until the user presses a key.
    fn pause_for_key(&mut self);

    /// Switches to text mode, prints a titled error and waits for acknowledgement.
    fn report_error(&mut self, title: &str, lines: &[&str]) {
        self.begin_text_screen(title);
        for line in lines {
            self.print_error(line);
        }
        self.pause_for_key();
    }
}

/// A [`Console`] that writes to the firmware text output.
#[derive(Default)]
pub struct UefiConsole {
    /// If a text screen is currently active.
    in_text_screen: bool,
}

impl UefiConsole {
    /// Creates a new [`UefiConsole`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new() -> Self {
        Self {
            in_text_screen: false,
        }
    }

    /// Marks the text screen as left, so the next message redraws its title.
    pub const fn leave_text_screen(&mut self) {
        self.in_text_screen = false;
    }
}

impl Console for UefiConsole {
    fn begin_text_screen(&mut self, title: &str) {
        if self.in_text_screen {
            return;
        }
        with_stdout(|stdout| {
            let _ = stdout.set_color(Color::White, Color::Black);
            let _ = stdout.clear();
            let _ = stdout.set_color(Color::Black, Color::LightGray);
            let _ = writeln!(stdout, " {title} ");
            let _ = stdout.set_color(Color::LightGray, Color::Black);
            let _ = writeln!(stdout);
        });
        self.in_text_screen = true;
    }

    fn print_line(&mut self, text: &str) {
        with_stdout(|stdout| {
            let _ = writeln!(stdout, "{text}");
        });
    }

    fn print_error(&mut self, text: &str) {
        with_stdout(|stdout| {
            let _ = stdout.set_color(Color::Yellow, Color::Black);
            let _ = writeln!(stdout, "{text}");
            let _ = stdout.set_color(Color::LightGray, Color::Black);
        });
    }

    fn pause_for_key(&mut self) {
        self.print_line("");
        self.print_line("* Hit any key to continue *");
        with_stdin(|stdin| {
            let _ = stdin.reset(false);
            if let Some(event) = stdin.wait_for_key_event() {
                let _ = boot::wait_for_event(&mut [event]);
            }
            let _ = stdin.read_key();
        });
    }
}

/// A [`Console`] that records everything, for tests.
#[cfg(test)]
#[derive(Default, Debug)]
pub struct RecordingConsole {
    /// Every line printed.
    pub lines: alloc::vec::Vec<alloc::string::String>,
    /// Every text screen title shown.
    pub screens: alloc::vec::Vec<alloc::string::String>,
    /// How many times a key press was awaited.
    pub pauses: usize,
}

#[cfg(test)]
impl Console for RecordingConsole {
    fn begin_text_screen(&mut self, title: &str) {
        self.screens.push(title.into());
    }

    fn print_line(&mut self, text: &str) {
        self.lines.push(text.into());
    }

    fn pause_for_key(&mut self) {
        self.pauses += 1;
    }
}
