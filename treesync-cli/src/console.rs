//! Console rendering of sync actions with line throttling.

use std::io::{self, Write};

use treesync_sync::{ActionLog, SyncAction};

const OMITTED_MARKER: &str = "Omitting next output lines...";

/// How many lines the console prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    /// Print this many lines, then a single omission marker.
    Limit(usize),
    All,
}

impl Verbosity {
    /// `--quiet` wins over `--verbose`; `--verbose 0` means unlimited.
    pub fn from_flags(quiet: bool, verbose: Option<usize>) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, Some(0)) | (false, None) => Verbosity::All,
            (false, Some(n)) => Verbosity::Limit(n),
        }
    }
}

/// Writes action lines and notes to `out`, one per line.
pub struct ConsoleLog<W: Write = io::Stdout> {
    out: W,
    verbosity: Verbosity,
    lines: usize,
}

impl ConsoleLog {
    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::new(io::stdout(), verbosity)
    }
}

impl<W: Write> ConsoleLog<W> {
    pub fn new(out: W, verbosity: Verbosity) -> Self {
        Self {
            out,
            verbosity,
            lines: 0,
        }
    }

    fn line(&mut self, text: &str) {
        let shown = match self.verbosity {
            Verbosity::Quiet => None,
            Verbosity::All => Some(text),
            Verbosity::Limit(max) if self.lines < max => Some(text),
            Verbosity::Limit(max) if self.lines == max => Some(OMITTED_MARKER),
            Verbosity::Limit(_) => None,
        };
        self.lines += 1;
        if let Some(text) = shown {
            // A closed stdout must not abort the sync.
            let _ = writeln!(self.out, "{text}");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ActionLog for ConsoleLog<W> {
    fn record(&mut self, action: &SyncAction) {
        self.line(&action.to_string());
    }

    fn note(&mut self, message: &str) {
        self.line(message);
    }
}
