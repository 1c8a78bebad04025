use clap::ValueEnum;
use nu_ansi_term::{Color, Style};
use serde_json::Value;
use std::io::IsTerminal;

use crate::{ReplayReport, SnapshotEvent};

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Text renderer for replay reports.
pub struct Ui {
    palette: Palette,
    paint: bool,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let paint = theme != Theme::Plain && std::io::stdout().is_terminal();

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = match theme {
            Theme::Plain => Palette::plain(),
            Theme::Light => Palette::light(),
            Theme::Dark | Theme::Auto => Palette::dark(),
        };
        Self { palette, paint }
    }

    /// Summary counters, then one line per delivered snapshot.
    pub(crate) fn replay(&self, report: &ReplayReport) {
        self.heading(&format!("Replay {}", report.operation));
        let counters = [
            ("payloads", report.payloads as u64),
            ("revision", report.revision),
            ("records", report.records as u64),
        ];
        for (name, count) in counters {
            println!("  {} {count}", self.style(self.palette.key, format!("{name:>8}:")));
        }
        if !report.snapshots.is_empty() {
            self.heading("Snapshots");
            for event in &report.snapshots {
                self.snapshot(event);
            }
        }
        self.outcome(report);
    }

    /// Canonical records in id order.
    pub(crate) fn inspect(&self, report: &ReplayReport) {
        self.heading(&format!("Records after {}", report.operation));
        if let Value::Object(records) = &report.source {
            for (id, record) in records {
                let body = match record {
                    Value::Null => self.style(self.palette.missing, "<deleted>".to_owned()),
                    other => other.to_string(),
                };
                println!("  {} {body}", self.style(self.palette.id, id.clone()));
            }
        }
        self.outcome(report);
    }

    fn snapshot(&self, event: &SnapshotEvent) {
        let selector = self.style(self.palette.id, event.selector.clone());
        if event.missing_data {
            let marker = self.style(self.palette.missing, "(missing data)".to_owned());
            println!("  {selector} {} {marker}", event.data);
        } else {
            println!("  {selector} {}", event.data);
        }
    }

    fn outcome(&self, report: &ReplayReport) {
        match report.error_code {
            None => println!(
                "{} {} completed after {} payloads",
                self.style(self.palette.ok, OK_ICON.to_owned()),
                report.operation,
                report.payloads
            ),
            Some(code) => eprintln!(
                "{} {} failed [{code}]: {}",
                self.style(self.palette.failed, FAILED_ICON.to_owned()),
                report.operation,
                report.outcome
            ),
        }
    }

    fn heading(&self, title: &str) {
        println!("{}", self.style(self.palette.heading, format!("{HEADING_ICON} {title}")));
    }

    fn style(&self, style: Style, text: String) -> String {
        if self.paint {
            style.paint(text).to_string()
        } else {
            text
        }
    }
}

#[derive(Clone, Copy)]
struct Palette {
    heading: Style,
    key: Style,
    id: Style,
    missing: Style,
    ok: Style,
    failed: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            id: Style::new().fg(Color::Cyan),
            missing: Style::new().fg(Color::Yellow),
            ok: Style::new().fg(Color::LightGreen).bold(),
            failed: Style::new().fg(Color::LightRed).bold(),
        }
    }

    fn light() -> Self {
        Self {
            heading: Style::new().fg(Color::Blue).bold(),
            key: Style::new().fg(Color::Black).bold(),
            id: Style::new().fg(Color::Blue),
            missing: Style::new().fg(Color::Magenta),
            ok: Style::new().fg(Color::Green).bold(),
            failed: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        let style = Style::new();
        Self {
            heading: style,
            key: style,
            id: style,
            missing: style,
            ok: style,
            failed: style,
        }
    }
}

const HEADING_ICON: &str = "▸";
const OK_ICON: &str = "✔";
const FAILED_ICON: &str = "✘";
