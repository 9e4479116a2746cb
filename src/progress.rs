use std::io::{self, IsTerminal, Stderr};
use std::sync::Mutex;

use ratatui::backend::CrosstermBackend;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Gauge;
use ratatui::{Terminal, TerminalOptions, Viewport};

use tracing::warn;

use crate::app::{Phase, ProgressEvent, ProgressSink};

const FILL: Color = Color::Rgb(25, 118, 210);
const TRACK: Color = Color::Rgb(227, 242, 253);

pub struct TerminalProgress {
    terminal: Mutex<Option<Terminal<CrosstermBackend<Stderr>>>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::open(io::stderr().is_terminal())
    }

    /// Without a usable terminal the gauge stays hidden and events are
    /// dropped; the search itself is unaffected.
    pub fn open(is_terminal: bool) -> Self {
        let terminal = if is_terminal {
            match inline_terminal() {
                Ok(terminal) => Some(terminal),
                Err(err) => {
                    warn!(%err, "progress gauge unavailable");
                    None
                }
            }
        } else {
            warn!("stderr is not a terminal, progress gauge disabled");
            None
        };
        Self {
            terminal: Mutex::new(terminal),
        }
    }

    pub fn is_active(&self) -> bool {
        self.terminal
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    pub fn finish(&self) {
        if let Ok(mut guard) = self.terminal.lock() {
            if let Some(mut terminal) = guard.take() {
                let _ = terminal.clear();
            }
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        if matches!(event.phase, Phase::Done) {
            self.finish();
            return;
        }
        let Ok(mut guard) = self.terminal.lock() else {
            return;
        };
        let Some(terminal) = guard.as_mut() else {
            return;
        };
        let ratio = gauge_ratio(&event);
        let gauge = Gauge::default()
            .gauge_style(
                Style::default()
                    .fg(FILL)
                    .bg(TRACK)
                    .add_modifier(Modifier::BOLD),
            )
            .ratio(ratio)
            .label(event.message);
        let _ = terminal.draw(|frame| frame.render_widget(gauge, frame.area()));
    }
}

fn inline_terminal() -> io::Result<Terminal<CrosstermBackend<Stderr>>> {
    Terminal::with_options(
        CrosstermBackend::new(io::stderr()),
        TerminalOptions {
            viewport: Viewport::Inline(1),
        },
    )
}

fn gauge_ratio(event: &ProgressEvent) -> f64 {
    match event.phase {
        Phase::Synthesis => 1.0,
        _ if event.total == 0 => 0.0,
        _ => (event.done as f64 / event.total as f64).clamp(0.0, 1.0),
    }
}
