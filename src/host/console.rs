use std::io::{self, Write};

use crate::app::{Buttons, Controller, Screen, Tone};

/// Screen on an ANSI terminal, colored the way the console text output is.
pub struct AnsiScreen<W: Write> {
    out: W,
}

impl AnsiScreen<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> AnsiScreen<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn color(tone: Tone) -> Option<u8> {
    match tone {
        Tone::Plain => None,
        Tone::Bad => Some(1),
        Tone::Good => Some(2),
        Tone::Warn => Some(3),
        Tone::Title | Tone::Hint => Some(6),
    }
}

impl<W: Write> Screen for AnsiScreen<W> {
    fn clear(&mut self) {
        // a broken terminal shouldn't stop syncing
        let _ = write!(self.out, "\x1b[2J\x1b[H");
        let _ = self.out.flush();
    }

    fn line(&mut self, tone: Tone, text: &str) {
        let _ = match color(tone) {
            Some(c) => writeln!(self.out, "\x1b[3{c}m{text}\x1b[39m"),
            None => writeln!(self.out, "{text}"),
        };
        let _ = self.out.flush();
    }
}

/// Controller for running unattended: optionally presses A on the first
/// frame and nothing after that.
pub struct AutoPilot {
    press_start: bool,
}

impl AutoPilot {
    pub fn new(autostart: bool) -> Self {
        Self {
            press_start: autostart,
        }
    }
}

impl Controller for AutoPilot {
    fn poll(&mut self) -> Buttons {
        if std::mem::take(&mut self.press_start) {
            Buttons::A
        } else {
            Buttons::default()
        }
    }
}
