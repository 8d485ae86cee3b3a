use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A calendar collection as advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarListEntry {
    pub name: String,
    pub href: String,
}

/// A single VEVENT, plus the WebDAV bookkeeping needed to address it.
///
/// `etag`, `href` and `calendar_href` are empty until the event has been
/// stored on (or fetched from) the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub calendar_href: String,
}

impl Event {
    pub fn new(summary: &str) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            summary: summary.to_string(),
            ..Self::default()
        }
    }

    /// Case-insensitive substring match over the human-readable fields.
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        if self.summary.to_lowercase().contains(&q) {
            return true;
        }
        if let Some(desc) = &self.description
            && desc.to_lowercase().contains(&q)
        {
            return true;
        }
        if let Some(loc) = &self.location
            && loc.to_lowercase().contains(&q)
        {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_gets_a_uid() {
        let a = Event::new("Standup");
        let b = Event::new("Standup");
        assert!(!a.uid.is_empty());
        assert_ne!(a.uid, b.uid);
        assert_eq!(a.summary, "Standup");
    }

    #[test]
    fn test_matches_query_checks_all_text_fields() {
        let mut event = Event::new("Team sync");
        event.description = Some("Quarterly planning".to_string());
        event.location = Some("Room 4B".to_string());

        assert!(event.matches_query("team"));
        assert!(event.matches_query("PLANNING"));
        assert!(event.matches_query("room 4b"));
        assert!(!event.matches_query("offsite"));
    }
}
