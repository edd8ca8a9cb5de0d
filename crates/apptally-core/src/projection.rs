use anyhow::{Context, Result};
use std::io::Write;

use crate::classification::Classification;
use crate::day::DayKey;
use crate::ledger::{format_duration, DayRecords};
use crate::window_source::WindowSnapshot;

pub const WINDOW_TITLE_SEPARATOR: &str = " | ";

/// One display row of a day's usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedRow {
    pub process_name: String,
    pub display_name: String,
    pub seconds: u64,
    pub duration: String,
    /// Live window titles joined by [`WINDOW_TITLE_SEPARATOR`]; empty for
    /// past days or when the process has no visible window right now.
    pub window_titles: String,
    pub highlighted: bool,
}

/// Builds the ordered view of `day`: tracked processes only, highlighted ones
/// first, each group by descending seconds. Ties keep process-name order.
pub fn project(
    day: DayKey,
    today: DayKey,
    classification: &Classification,
    records: &DayRecords,
    live: Option<&WindowSnapshot>,
) -> Vec<ProjectedRow> {
    let live = if day == today { live } else { None };

    let (mut highlighted, mut normal): (Vec<_>, Vec<_>) = records
        .iter()
        .filter(|(name, _)| classification.is_tracked(name))
        .map(|(name, record)| {
            let window_titles = live
                .and_then(|snapshot| snapshot.get(name))
                .map(|titles| {
                    titles
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(WINDOW_TITLE_SEPARATOR)
                })
                .unwrap_or_default();
            ProjectedRow {
                process_name: name.clone(),
                display_name: classification.display_name(name).to_owned(),
                seconds: record.time,
                duration: format_duration(record.time),
                window_titles,
                highlighted: classification.is_highlighted(name),
            }
        })
        .partition(|row| row.highlighted);

    highlighted.sort_by(|a, b| b.seconds.cmp(&a.seconds));
    normal.sort_by(|a, b| b.seconds.cmp(&a.seconds));
    highlighted.extend(normal);
    highlighted
}

/// Writes rows as CSV with a header line.
pub fn write_csv<W: Write>(rows: &[ProjectedRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(["application", "process", "seconds", "duration", "windows"])
        .context("failed to write CSV header")?;
    for row in rows {
        let seconds = row.seconds.to_string();
        csv_writer
            .write_record([
                row.display_name.as_str(),
                row.process_name.as_str(),
                seconds.as_str(),
                row.duration.as_str(),
                row.window_titles.as_str(),
            ])
            .context("failed to write CSV row")?;
    }
    csv_writer.flush().context("failed to flush CSV writer")?;
    Ok(())
}
