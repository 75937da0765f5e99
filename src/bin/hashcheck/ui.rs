use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Outcome marker printed in front of a status line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Pass,
    Fail,
    Note,
}

impl Status {
    fn glyph(self) -> &'static str {
        match self {
            Status::Pass => "✔",
            Status::Fail => "✘",
            Status::Note => "ℹ",
        }
    }
}

/// Terminal renderer for human-readable output.
///
/// Colors are used only when stdout is a terminal. In quiet mode every line
/// is printed bare and no spinner is drawn, which keeps output stable for
/// scripts.
pub struct Ui {
    colors: Option<Colors>,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let colors = match theme {
            Theme::Plain => None,
            _ if quiet || !std::io::stdout().is_terminal() => None,
            Theme::Light => Some(Colors::light()),
            Theme::Dark | Theme::Auto => Some(Colors::dark()),
        };

        #[cfg(windows)]
        if colors.is_some() {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        Self { colors, quiet }
    }

    pub fn status(&self, status: Status, message: &str) {
        if self.quiet {
            println!("{message}");
            return;
        }
        let glyph = status.glyph();
        match &self.colors {
            Some(colors) => println!("{} {message}", colors.status(status).paint(glyph)),
            None => println!("{glyph} {message}"),
        }
    }

    /// Prints `title` followed by right-aligned `key: value` rows.
    pub fn rows<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        let Some(width) = rows.iter().map(|(key, _)| key.len()).max() else {
            return;
        };

        match (&self.colors, self.quiet) {
            (_, true) => println!("{title}"),
            (Some(colors), false) => println!("{}", colors.title.paint(format!("▸ {title}"))),
            (None, false) => println!("▸ {title}"),
        }
        for (key, value) in rows {
            match &self.colors {
                Some(colors) => println!(
                    "  {} {}",
                    colors.key.paint(format!("{key:>width$}:")),
                    colors.value.paint(value)
                ),
                None => println!("  {key:>width$}: {value}"),
            }
        }
    }

    /// Starts a spinner for a long-running step.
    pub fn step(&self, label: impl Into<String>) -> Step {
        let label = label.into();
        let spinner = (!self.quiet).then(|| {
            let spinner = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
            spinner.set_style(style);
            spinner.set_message(label.clone());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        Step {
            label,
            started: Instant::now(),
            spinner,
        }
    }
}

/// A running step. Dropping it without [`Step::done`] marks it abandoned.
pub struct Step {
    label: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl Step {
    pub fn done(mut self) -> Duration {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        self.started.elapsed()
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            let elapsed = format_duration(self.started.elapsed());
            spinner.abandon_with_message(format!("{} abandoned after {elapsed}", self.label));
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs:.2}s")
    } else {
        format!("{:.1}ms", secs * 1_000.0)
    }
}

struct Colors {
    title: Style,
    key: Style,
    value: Style,
    pass: Style,
    fail: Style,
    note: Style,
}

impl Colors {
    fn dark() -> Self {
        Self {
            title: Color::Cyan.bold(),
            key: Color::LightBlue.normal(),
            value: Color::White.normal(),
            pass: Color::LightGreen.bold(),
            fail: Color::LightRed.bold(),
            note: Color::LightCyan.normal(),
        }
    }

    fn light() -> Self {
        Self {
            title: Color::Blue.bold(),
            key: Color::DarkGray.normal(),
            value: Color::Black.normal(),
            pass: Color::Green.bold(),
            fail: Color::Red.bold(),
            note: Color::Purple.normal(),
        }
    }

    fn status(&self, status: Status) -> Style {
        match status {
            Status::Pass => self.pass,
            Status::Fail => self.fail,
            Status::Note => self.note,
        }
    }
}
