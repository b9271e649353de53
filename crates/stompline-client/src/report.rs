use std::fmt::Write as _;
use std::path::Path;

use chrono::{Local, TimeZone};
use stompline_frame::Frame;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::event::{load_events_file, Event};
use crate::session::Session;

/// Longest description shown verbatim in a summary.
pub const DESCRIPTION_LIMIT: usize = 27;

/// Load an events file and publish every event, oldest first.
///
/// Each event is stamped with the logged-in user. Stops at the first
/// failed send; returns the channel and the number of frames sent.
pub fn report<C: Connection + ?Sized>(
    session: &Session,
    connection: &C,
    path: &Path,
) -> Result<(String, usize)> {
    let file = load_events_file(path)?;
    let owner = session.username().ok_or(ClientError::NotConnected)?;

    let mut events = file.events;
    events.sort_by_key(|event| event.date_time);

    let total = events.len();
    for (sent, mut event) in events.into_iter().enumerate() {
        event.user.clone_from(&owner);
        let frame = Frame::send(&file.channel, event.to_body());
        if let Err(err) = connection.send_frame(&frame) {
            warn!(channel = %file.channel, sent, total, "report aborted");
            return Err(err);
        }
    }

    info!(channel = %file.channel, count = total, "report sent");
    Ok((file.channel, total))
}

/// Render the summary of `user`'s events on `channel`.
pub fn summarize(session: &Session, channel: &str, user: &str) -> Result<String> {
    summarize_counted(session, channel, user).map(|(text, _)| text)
}

fn summarize_counted(session: &Session, channel: &str, user: &str) -> Result<(String, usize)> {
    session.with_events(|log| {
        let events = log
            .get(channel)
            .ok_or_else(|| ClientError::UnknownChannel(channel.to_string()))?;
        let mut selected: Vec<&Event> = events.iter().filter(|e| e.user == user).collect();
        selected.sort_by(|a, b| {
            a.date_time
                .cmp(&b.date_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok((render_summary(channel, &selected), selected.len()))
    })
}

/// Render and write a summary, replacing any existing file.
///
/// Returns the number of events included.
pub fn write_summary(session: &Session, channel: &str, user: &str, path: &Path) -> Result<usize> {
    let (summary, count) = summarize_counted(session, channel, user)?;
    std::fs::write(path, &summary).map_err(|source| ClientError::SummaryWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!(%channel, %user, path = %path.display(), count, "summary written");
    Ok(count)
}

/// The digest text for already filtered and sorted events.
pub fn render_summary(channel: &str, events: &[&Event]) -> String {
    let active = events.iter().filter(|e| e.flag("active")).count();
    let forces = events
        .iter()
        .filter(|e| e.flag("forces_arrival_at_scene"))
        .count();

    let mut out = String::new();
    let _ = writeln!(out, "Channel {channel}");
    let _ = writeln!(out, "Stats:");
    let _ = writeln!(out, "Total: {}", events.len());
    let _ = writeln!(out, "active: {active}");
    let _ = writeln!(out, "forces arrival at scene: {forces}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Event Reports:");

    for (index, event) in events.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Report_{}:", index + 1);
        let _ = writeln!(out, "  city: {}", event.city);
        let _ = writeln!(out, "  date time: {}", format_date_time(event.date_time));
        let _ = writeln!(out, "  event name: {}", event.name);
        let _ = writeln!(out, "  summary: {}", truncate_description(&event.description));
        if !event.general_information.is_empty() {
            let _ = writeln!(out, "  general information:");
            for (key, value) in &event.general_information {
                let _ = writeln!(out, "    {key}: {value}");
            }
        }
    }

    out
}

/// `dd/mm/yy HH:MM` in local time. Out-of-range timestamps are shown raw.
pub fn format_date_time(epoch_seconds: i64) -> String {
    match Local.timestamp_opt(epoch_seconds, 0).single() {
        Some(time) => time.format("%d/%m/%y %H:%M").to_string(),
        None => epoch_seconds.to_string(),
    }
}

/// Cut descriptions longer than [`DESCRIPTION_LIMIT`] characters and mark them with `...`.
pub fn truncate_description(description: &str) -> String {
    if description.chars().count() <= DESCRIPTION_LIMIT {
        return description.to_string();
    }
    let mut cut: String = description.chars().take(DESCRIPTION_LIMIT).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn event(name: &str, user: &str, date_time: i64, active: bool) -> Event {
        Event {
            name: name.to_string(),
            city: "Haifa".to_string(),
            date_time,
            description: format!("{name} description"),
            user: user.to_string(),
            general_information: BTreeMap::from([
                ("active".to_string(), active.to_string()),
                ("forces_arrival_at_scene".to_string(), "true".to_string()),
            ]),
        }
    }

    #[test]
    fn truncation_boundary() {
        let exact = "a".repeat(27);
        assert_eq!(truncate_description(&exact), exact);
        assert_eq!(
            truncate_description(&"b".repeat(28)),
            format!("{}...", "b".repeat(27))
        );
        assert_eq!(truncate_description(""), "");
        // Counted in characters, not bytes.
        let wide = "é".repeat(27);
        assert_eq!(truncate_description(&wide), wide);
    }

    #[test]
    fn date_format_shape() {
        let formatted = format_date_time(1_703_671_200);
        assert_eq!(formatted.len(), 14);
        assert_eq!(&formatted[2..3], "/");
        assert_eq!(&formatted[5..6], "/");
        assert_eq!(&formatted[8..9], " ");
        assert_eq!(&formatted[11..12], ":");
        assert_eq!(format_date_time(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn summary_filters_by_user_and_sorts() {
        let session = Session::new();
        session.record_event("sports", event("zeta", "alice", 20, true));
        session.record_event("sports", event("beta", "bob", 5, true));
        session.record_event("sports", event("alpha", "alice", 20, false));
        session.record_event("sports", event("gamma", "alice", 10, true));
        session.record_event("news", event("other", "alice", 1, true));

        let summary = summarize(&session, "sports", "alice").unwrap();

        assert!(summary.starts_with(
            "Channel sports\nStats:\nTotal: 3\nactive: 2\nforces arrival at scene: 3\n"
        ));
        assert!(!summary.contains("beta"));
        assert!(!summary.contains("other"));

        let gamma = summary.find("event name: gamma").unwrap();
        let alpha = summary.find("event name: alpha").unwrap();
        let zeta = summary.find("event name: zeta").unwrap();
        assert!(gamma < alpha && alpha < zeta);
        assert!(summary.contains("Report_3:"));
        assert!(!summary.contains("Report_4:"));
    }

    #[test]
    fn summary_of_unknown_channel_is_rejected() {
        let session = Session::new();
        assert!(matches!(
            summarize(&session, "nowhere", "alice"),
            Err(ClientError::UnknownChannel(channel)) if channel == "nowhere"
        ));
    }

    #[test]
    fn summary_for_user_without_events_is_empty() {
        let session = Session::new();
        session.record_event("sports", event("match", "bob", 1, true));

        let summary = summarize(&session, "sports", "alice").unwrap();
        assert!(summary.contains("Total: 0"));
        assert!(!summary.contains("Report_"));
    }

    #[test]
    fn write_summary_overwrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        std::fs::write(&path, "stale contents that should disappear").unwrap();

        let session = Session::new();
        let mut long = event("storm", "alice", 1_703_671_200, true);
        long.description = "Winds of over one hundred kilometres per hour".to_string();
        session.record_event("weather", long);

        let count = write_summary(&session, "weather", "alice", &path).unwrap();
        assert_eq!(count, 1);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("stale"));
        assert!(written.contains("  city: Haifa"));
        assert!(written.contains(&format_date_time(1_703_671_200)));
        assert!(written.contains("  summary: Winds of over one hundred k..."));
        assert!(written.contains("    active: true"));
    }

    #[test]
    fn write_summary_reports_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("summary.txt");

        let session = Session::new();
        session.record_event("weather", event("storm", "alice", 1, true));

        assert!(matches!(
            write_summary(&session, "weather", "alice", &path),
            Err(ClientError::SummaryWrite { .. })
        ));
    }
}
