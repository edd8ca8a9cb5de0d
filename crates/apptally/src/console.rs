use anyhow::{bail, Context, Result};
use apptally_core::projection::write_csv;
use apptally_core::{DayKey, LoadStatus, ProjectedRow, Tracker};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const NO_WINDOWS: &str = "No active windows";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Watch,
    Prev,
    Next,
    Today,
    Date(DayKey),
    Days,
    Start,
    Stop,
    Status,
    Add(Vec<String>),
    Candidates(String),
    Remove(String),
    Rename { label: String, alias: String },
    Highlight(String),
    Export(PathBuf),
    Reload,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parses one console line; blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    if verb.is_empty() {
        return Ok(None);
    }

    let command = match verb.to_ascii_lowercase().as_str() {
        "show" | "ls" => Command::Show,
        "watch" => Command::Watch,
        "prev" | "<" => Command::Prev,
        "next" | ">" => Command::Next,
        "today" => Command::Today,
        "date" => Command::Date(required(rest, "date <YYYY-MM-DD>")?.parse()?),
        "days" => Command::Days,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "add" => Command::Add(
            required(rest, "add <process>...")?
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        ),
        "candidates" => Command::Candidates(rest.to_owned()),
        "remove" | "rm" => Command::Remove(required(rest, "remove <application>")?.to_owned()),
        "rename" => {
            let usage = "rename <application> = <new name>";
            let (label, alias) = required(rest, usage)?
                .split_once('=')
                .context(format!("usage: {usage}"))?;
            Command::Rename {
                label: required(label.trim(), usage)?.to_owned(),
                alias: required(alias.trim(), usage)?.to_owned(),
            }
        }
        "highlight" | "hl" => {
            Command::Highlight(required(rest, "highlight <application>")?.to_owned())
        }
        "export" => Command::Export(PathBuf::from(required(rest, "export <file.csv>")?)),
        "reload" => Command::Reload,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command: {other} (type `help`)"),
    };
    Ok(Some(command))
}

fn required<'a>(value: &'a str, usage: &str) -> Result<&'a str> {
    if value.is_empty() {
        bail!("no application selected; usage: {usage}");
    }
    Ok(value)
}

/// Command-thread front-end over a [`Tracker`]: keeps the selected day and
/// renders projections as a text table.
pub struct Console<'a> {
    tracker: &'a Tracker,
    selected_day: DayKey,
    watching: Arc<AtomicBool>,
}

impl<'a> Console<'a> {
    pub fn new(tracker: &'a Tracker, watching: Arc<AtomicBool>) -> Self {
        Self {
            tracker,
            selected_day: DayKey::today(),
            watching,
        }
    }

    pub fn selected_day(&self) -> DayKey {
        self.selected_day
    }

    pub fn execute(&mut self, command: Command, out: &mut dyn Write) -> Result<Flow> {
        match command {
            Command::Show => self.render(out)?,
            Command::Watch => {
                let watching = !self.watching.fetch_xor(true, Ordering::SeqCst);
                writeln!(out, "watch {}", if watching { "on" } else { "off" })?;
                if watching {
                    self.render(out)?;
                }
            }
            Command::Prev => self.select(self.shift(-1)?, out)?,
            Command::Next => self.select(self.shift(1)?, out)?,
            Command::Today => self.select(DayKey::today(), out)?,
            Command::Date(day) => self.select(day, out)?,
            Command::Days => {
                let days = self.tracker.days();
                if days.is_empty() {
                    writeln!(out, "No usage recorded yet.")?;
                }
                for day in days {
                    let marker = if day == self.selected_day { '>' } else { ' ' };
                    writeln!(out, "{marker} {day}")?;
                }
            }
            Command::Start => {
                let started = self.tracker.start()?;
                writeln!(out, "{}", if started { "tracking started" } else { "already tracking" })?;
            }
            Command::Stop => {
                let stopped = self.tracker.stop();
                writeln!(out, "{}", if stopped { "tracking stopped" } else { "not tracking" })?;
            }
            Command::Status => {
                let classification = self.tracker.classification();
                writeln!(
                    out,
                    "tracking: {} | day: {} | tracked: {} | removed: {} | highlighted: {}",
                    if self.tracker.is_running() { "running" } else { "stopped" },
                    self.selected_day,
                    classification.tracked.len(),
                    classification.removed.len(),
                    classification.highlighted.len()
                )?;
            }
            Command::Add(names) => {
                let added = self.tracker.add_tracked(&names)?;
                writeln!(out, "now tracking {added} new application(s)")?;
                self.render(out)?;
            }
            Command::Candidates(filter) => {
                let candidates = self.tracker.candidates(&filter);
                if candidates.is_empty() {
                    writeln!(out, "No untracked applications match.")?;
                }
                for name in candidates {
                    writeln!(out, "  {name}")?;
                }
            }
            Command::Remove(label) => {
                let name = self.tracker.remove_tracked(&label)?;
                writeln!(out, "stopped tracking {name}")?;
                self.render(out)?;
            }
            Command::Rename { label, alias } => {
                let name = self.tracker.rename(&label, &alias)?;
                writeln!(out, "{name} is now shown as {alias}")?;
                self.render(out)?;
            }
            Command::Highlight(label) => {
                let (name, highlighted) = self.tracker.toggle_highlight(&label)?;
                let state = if highlighted { "highlighted" } else { "no longer highlighted" };
                writeln!(out, "{name} {state}")?;
                self.render(out)?;
            }
            Command::Export(path) => {
                let rows = self.tracker.project(self.selected_day);
                export_csv(&rows, &path)?;
                writeln!(out, "exported {} row(s) to {}", rows.len(), path.display())?;
            }
            Command::Reload => {
                let report = self.tracker.reload()?;
                writeln!(out, "configuration: {}", describe_load(&report.config))?;
                writeln!(out, "usage history: {}", describe_load(&report.usage))?;
            }
            Command::Help => print_help(out)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn render(&self, out: &mut dyn Write) -> Result<()> {
        let today = DayKey::today();
        let rows = self.tracker.project(self.selected_day);
        let suffix = if self.selected_day == today { " (today)" } else { "" };
        writeln!(out, "== {}{} ==", self.selected_day, suffix)?;
        write_table(&rows, out)
    }

    fn shift(&self, delta: i64) -> Result<DayKey> {
        self.selected_day
            .shifted(delta)
            .context("date is out of range")
    }

    fn select(&mut self, day: DayKey, out: &mut dyn Write) -> Result<()> {
        self.selected_day = day;
        self.render(out)
    }
}

fn write_table(rows: &[ProjectedRow], out: &mut dyn Write) -> Result<()> {
    if rows.is_empty() {
        writeln!(out, "No usage recorded for this day.")?;
        return Ok(());
    }

    let name_width = rows
        .iter()
        .map(|row| row.display_name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Application".len());
    let duration_width = rows
        .iter()
        .map(|row| row.duration.len())
        .max()
        .unwrap_or(0)
        .max("Usage".len());

    writeln!(
        out,
        "  {:<name_width$}  {:<duration_width$}  Windows",
        "Application", "Usage"
    )?;
    for row in rows {
        let marker = if row.highlighted { '*' } else { ' ' };
        let windows = if row.window_titles.is_empty() {
            NO_WINDOWS
        } else {
            row.window_titles.as_str()
        };
        writeln!(
            out,
            "{marker} {:<name_width$}  {:<duration_width$}  {windows}",
            row.display_name, row.duration
        )?;
    }
    Ok(())
}

fn export_csv(rows: &[ProjectedRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create export directory: {}", parent.display()))?;
        }
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create export file: {}", path.display()))?;
    write_csv(rows, BufWriter::new(file))
}

pub fn describe_load(status: &LoadStatus) -> String {
    match status {
        LoadStatus::Loaded => "loaded".to_owned(),
        LoadStatus::Missing => "not found, starting empty".to_owned(),
        LoadStatus::Corrupt(reason) => format!("unusable, starting empty ({reason})"),
    }
}

fn print_help(out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "\
Commands:
  show                         Show usage for the selected day
  watch                        Toggle re-rendering after every sample
  prev | next | today          Move the selected day
  date <YYYY-MM-DD>            Jump to a day
  days                         List days with recorded usage
  start | stop | status        Control the sampling loop
  add <process>...             Track processes (also lifts a removal)
  candidates [filter]          List running applications not yet tracked
  remove <application>         Stop tracking and ignore from now on
  rename <application> = <new name>
  highlight <application>      Toggle priority placement
  export <file.csv>            Write the selected day as CSV
  reload                       Re-read both documents from disk (tracking stopped)
  quit                         Save and exit"
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apptally_core::{RawWindow, SamplerConfig, StaticWindowSource, TrackerPaths};
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> Tracker {
        let source = StaticWindowSource::new(vec![
            RawWindow::visible("chrome.exe", "Mail", 1280, 720),
            RawWindow::visible("code.exe", "main.rs", 1280, 720),
        ]);
        Tracker::open(
            &TrackerPaths::in_dir(dir.path()),
            Box::new(source),
            SamplerConfig::default(),
        )
        .0
    }

    fn run(console: &mut Console<'_>, line: &str) -> String {
        let mut out = Vec::new();
        let command = parse_command(line).unwrap().unwrap();
        console.execute(command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("SHOW").unwrap(), Some(Command::Show));
        assert_eq!(
            parse_command("add a.exe  b.exe").unwrap(),
            Some(Command::Add(vec!["a.exe".to_owned(), "b.exe".to_owned()]))
        );
        assert_eq!(
            parse_command("rename My Browser = Web").unwrap(),
            Some(Command::Rename {
                label: "My Browser".to_owned(),
                alias: "Web".to_owned()
            })
        );
        assert_eq!(
            parse_command("remove Visual Studio Code").unwrap(),
            Some(Command::Remove("Visual Studio Code".to_owned()))
        );
        assert_eq!(
            parse_command("date 2024-01-01").unwrap(),
            Some(Command::Date("2024-01-01".parse().unwrap()))
        );
        assert_eq!(parse_command("candidates").unwrap(), Some(Command::Candidates(String::new())));
    }

    #[test]
    fn rejects_missing_selection() {
        assert!(parse_command("remove").is_err());
        assert!(parse_command("highlight   ").is_err());
        assert!(parse_command("rename chrome.exe").is_err());
        assert!(parse_command("rename chrome.exe = ").is_err());
        assert!(parse_command("date yesterday").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn renders_highlighted_rows_first_with_aliases() {
        let dir = tempdir().unwrap();
        let tracker = open(&dir);
        tracker.sample_now().unwrap();
        tracker.sample_now().unwrap();
        let mut console = Console::new(&tracker, Arc::new(AtomicBool::new(false)));

        run(&mut console, "rename code.exe = Editor");
        let output = run(&mut console, "highlight Editor");

        let editor = output.find("* Editor").unwrap();
        let chrome = output.find("chrome.exe").unwrap();
        assert!(editor < chrome);
        assert!(output.contains("0h 0m 2s"));
        assert!(output.contains("Mail"));
    }

    #[test]
    fn past_days_show_no_live_windows() {
        let dir = tempdir().unwrap();
        let tracker = open(&dir);
        tracker.sample_now().unwrap();
        let mut console = Console::new(&tracker, Arc::new(AtomicBool::new(false)));

        let output = run(&mut console, "prev");

        assert!(output.contains("No usage recorded for this day."));
        assert_eq!(console.selected_day(), DayKey::today().shifted(-1).unwrap());
        let back = run(&mut console, "today");
        assert!(back.contains("(today)"));
    }

    #[test]
    fn remove_hides_the_row() {
        let dir = tempdir().unwrap();
        let tracker = open(&dir);
        tracker.sample_now().unwrap();
        let mut console = Console::new(&tracker, Arc::new(AtomicBool::new(false)));

        let output = run(&mut console, "remove chrome.exe");

        assert!(output.starts_with("stopped tracking chrome.exe"));
        assert!(!output.contains("Mail"));
        assert!(tracker.store().is_removed("chrome.exe"));
    }

    #[test]
    fn watch_toggles_shared_flag() {
        let dir = tempdir().unwrap();
        let tracker = open(&dir);
        let watching = Arc::new(AtomicBool::new(false));
        let mut console = Console::new(&tracker, Arc::clone(&watching));

        assert!(run(&mut console, "watch").starts_with("watch on"));
        assert!(watching.load(Ordering::SeqCst));
        assert!(run(&mut console, "watch").starts_with("watch off"));
        assert!(!watching.load(Ordering::SeqCst));
    }

    #[test]
    fn export_writes_selected_day() {
        let dir = tempdir().unwrap();
        let tracker = open(&dir);
        tracker.sample_now().unwrap();
        let mut console = Console::new(&tracker, Arc::new(AtomicBool::new(false)));
        let path = dir.path().join("exports").join("today.csv");

        let output = run(&mut console, &format!("export {}", path.display()));

        assert!(output.starts_with("exported 2 row(s)"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("application,process,seconds,duration,windows"));
        assert!(text.contains("chrome.exe,chrome.exe,1,0h 0m 1s,Mail"));
    }

    #[test]
    fn quit_ends_the_session() {
        let dir = tempdir().unwrap();
        let tracker = open(&dir);
        let mut console = Console::new(&tracker, Arc::new(AtomicBool::new(false)));

        let flow = console.execute(Command::Quit, &mut Vec::new()).unwrap();

        assert_eq!(flow, Flow::Quit);
    }
}
