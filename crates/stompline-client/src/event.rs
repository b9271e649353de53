use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ClientError, Result};

const GENERAL_INFORMATION: &str = "general information";
const KNOWN_KEYS: [&str; 6] = [
    "user",
    "event name",
    "city",
    "date time",
    "description",
    GENERAL_INFORMATION,
];

/// A single reported occurrence on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub city: String,
    /// Seconds since the Unix epoch.
    pub date_time: i64,
    pub description: String,
    /// The user that reported the event.
    pub user: String,
    pub general_information: BTreeMap<String, String>,
}

impl Event {
    /// Render the SEND/MESSAGE body for this event.
    pub fn to_body(&self) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "user:{}", self.user);
        let _ = writeln!(body, "event name:{}", self.name);
        let _ = writeln!(body, "city:{}", self.city);
        let _ = writeln!(body, "date time:{}", self.date_time);
        let _ = writeln!(body, "description:{}", self.description);
        let _ = writeln!(body, "{GENERAL_INFORMATION}:");
        for (key, value) in &self.general_information {
            let _ = writeln!(body, "  {key}:{value}");
        }
        body
    }

    /// Parse a MESSAGE body produced by [`Event::to_body`].
    ///
    /// Unknown keys are ignored, except after the description: any line
    /// that does not start with a known key continues it.
    pub fn from_body(body: &str) -> Result<Self> {
        let mut name = None;
        let mut city = String::new();
        let mut date_time = None;
        let mut description = String::new();
        let mut user = String::new();
        let mut general_information = BTreeMap::new();

        let mut in_general = false;
        let mut last_key = "";

        for line in body.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if in_general && line.starts_with([' ', '\t']) {
                if let Some((key, value)) = line.trim().split_once(':') {
                    general_information.insert(key.trim().to_string(), value.trim().to_string());
                }
                continue;
            }
            in_general = false;

            let (key, value) = match line.split_once(':') {
                Some((key, value)) if KNOWN_KEYS.contains(&key.trim()) => (key.trim(), value),
                _ => {
                    if last_key == "description" {
                        description.push('\n');
                        description.push_str(line);
                    }
                    continue;
                }
            };

            match key {
                "user" => user = value.trim().to_string(),
                "event name" => name = Some(value.trim().to_string()),
                "city" => city = value.trim().to_string(),
                "date time" => {
                    let parsed = value.trim().parse::<i64>().map_err(|_| {
                        ClientError::MalformedEvent(format!(
                            "date time '{}' is not a number",
                            value.trim()
                        ))
                    })?;
                    date_time = Some(parsed);
                }
                "description" => description = value.trim().to_string(),
                GENERAL_INFORMATION => in_general = true,
                _ => {}
            }
            last_key = match key {
                "description" => "description",
                _ => "",
            };
        }

        Ok(Self {
            name: name.ok_or_else(|| ClientError::MalformedEvent("missing event name".into()))?,
            city,
            date_time: date_time
                .ok_or_else(|| ClientError::MalformedEvent("missing date time".into()))?,
            description,
            user,
            general_information,
        })
    }

    /// `true` if the general information has `key` set to `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.general_information
            .get(key)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}

/// Contents of an events file: the channel to report to and its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsFile {
    pub channel: String,
    pub events: Vec<Event>,
}

#[derive(Deserialize)]
struct RawEventsFile {
    channel_name: String,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    event_name: String,
    #[serde(default)]
    city: String,
    date_time: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    general_information: BTreeMap<String, serde_json::Value>,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        let general_information = raw
            .general_information
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Self {
            name: raw.event_name,
            city: raw.city,
            date_time: raw.date_time,
            description: raw.description,
            user: String::new(),
            general_information,
        }
    }
}

/// Load a JSON events file.
///
/// Events keep file order; the owning user is left empty for the caller
/// to fill in.
pub fn load_events_file(path: impl AsRef<Path>) -> Result<EventsFile> {
    let path = path.as_ref();
    let events_error = |reason: String| ClientError::EventsFile {
        path: path.to_path_buf(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|err| events_error(err.to_string()))?;
    let raw: RawEventsFile =
        serde_json::from_str(&text).map_err(|err| events_error(err.to_string()))?;

    Ok(EventsFile {
        channel: raw.channel_name,
        events: raw.events.into_iter().map(Event::from).collect(),
    })
}
