// Handles ICS serialization/deserialization
use crate::error::{Error, Result};
use crate::model::item::Event;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icalendar::{Calendar, CalendarComponent, Component, Property};

/// Parse a DTSTART/DTEND value. Returns the instant plus whether the value
/// was date-only. Floating times (no `Z`) are read as UTC.
fn parse_ics_datetime(val: &str) -> Option<(DateTime<Utc>, bool)> {
    if val.len() == 8 {
        return NaiveDate::parse_from_str(val, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| (d.and_utc(), true));
    }
    let fmt = if val.ends_with('Z') {
        "%Y%m%dT%H%M%SZ"
    } else {
        "%Y%m%dT%H%M%S"
    };
    NaiveDateTime::parse_from_str(val, fmt)
        .ok()
        .map(|d| (Utc.from_utc_datetime(&d), false))
}

impl Event {
    pub fn to_ics(&self) -> String {
        let mut vevent = icalendar::Event::new();
        vevent.uid(&self.uid);
        vevent.summary(&self.summary);
        if let Some(desc) = &self.description
            && !desc.is_empty()
        {
            vevent.description(desc);
        }
        if let Some(loc) = &self.location
            && !loc.is_empty()
        {
            vevent.add_property("LOCATION", loc);
        }
        vevent.timestamp(Utc::now());

        if self.all_day {
            if let Some(dt) = self.start {
                let mut prop = Property::new("DTSTART", &dt.format("%Y%m%d").to_string());
                prop.add_parameter("VALUE", "DATE");
                vevent.append_property(prop);
            }
            if let Some(dt) = self.end {
                let mut prop = Property::new("DTEND", &dt.format("%Y%m%d").to_string());
                prop.add_parameter("VALUE", "DATE");
                vevent.append_property(prop);
            }
        } else {
            if let Some(dt) = self.start {
                vevent.add_property("DTSTART", &dt.format("%Y%m%dT%H%M%SZ").to_string());
            }
            if let Some(dt) = self.end {
                vevent.add_property("DTEND", &dt.format("%Y%m%dT%H%M%SZ").to_string());
            }
        }

        let mut calendar = Calendar::new();
        calendar.push(vevent);
        calendar.to_string()
    }

    pub fn from_ics(
        raw_ics: &str,
        etag: String,
        href: String,
        calendar_href: String,
    ) -> Result<Self> {
        let calendar: Calendar = raw_ics
            .trim_start()
            .parse()
            .map_err(|e: String| Error::Ics(format!("parse: {}", e)))?;
        let vevent = calendar
            .components
            .iter()
            .find_map(|c| match c {
                CalendarComponent::Event(e) => Some(e),
                _ => None,
            })
            .ok_or_else(|| Error::Ics("no VEVENT component".to_string()))?;

        let summary = vevent.get_summary().unwrap_or("No Title").to_string();
        let description = vevent
            .get_description()
            .filter(|d| !d.is_empty())
            .map(|d| d.to_string());
        let location = vevent
            .properties()
            .get("LOCATION")
            .map(|p| p.value().to_string())
            .filter(|l| !l.is_empty());

        let mut uid = vevent.get_uid().unwrap_or_default().to_string();
        if uid.is_empty() {
            // Fall back to the resource filename so the event stays addressable.
            uid = href
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .trim_end_matches(".ics")
                .to_string();
        }

        let start = vevent
            .properties()
            .get("DTSTART")
            .and_then(|p| parse_ics_datetime(p.value()));
        let end = vevent
            .properties()
            .get("DTEND")
            .and_then(|p| parse_ics_datetime(p.value()));
        let all_day = start.map(|(_, date_only)| date_only).unwrap_or(false);

        Ok(Event {
            uid,
            summary,
            description,
            location,
            start: start.map(|(dt, _)| dt),
            end: end.map(|(dt, _)| dt),
            all_day,
            etag,
            href,
            calendar_href,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_VEVENT: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example//Example Calendar//EN\r\n\
BEGIN:VEVENT\r\n\
UID:evt-1\r\n\
SUMMARY:Team sync\r\n\
DTSTART:20230101T100000Z\r\n\
DTEND:20230101T110000Z\r\n\
LOCATION:Room 4B\r\n\
DESCRIPTION:Weekly catch-up\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_from_ics_reads_core_fields() {
        let event = Event::from_ics(
            SAMPLE_VEVENT,
            "\"etag-1\"".to_string(),
            "/cal/evt-1.ics".to_string(),
            "/cal/".to_string(),
        )
        .unwrap();

        assert_eq!(event.uid, "evt-1");
        assert_eq!(event.summary, "Team sync");
        assert_eq!(event.location.as_deref(), Some("Room 4B"));
        assert_eq!(event.description.as_deref(), Some("Weekly catch-up"));
        assert!(!event.all_day);
        assert_eq!(
            event.start.unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            event.end.unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(event.etag, "\"etag-1\"");
        assert_eq!(event.calendar_href, "/cal/");
    }

    #[test]
    fn test_from_ics_date_only_is_all_day() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:holiday\r\n\
SUMMARY:Holiday\r\n\
DTSTART;VALUE=DATE:20240201\r\n\
DTEND;VALUE=DATE:20240202\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let event =
            Event::from_ics(ics, String::new(), String::new(), String::new()).unwrap();

        assert!(event.all_day);
        assert_eq!(
            event.start.unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_from_ics_floating_time_read_as_utc() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:floating\r\n\
SUMMARY:Floating\r\n\
DTSTART:20240201T083000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let event =
            Event::from_ics(ics, String::new(), String::new(), String::new()).unwrap();

        assert_eq!(
            event.start.unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 8, 30, 0).unwrap()
        );
        assert!(event.end.is_none());
    }

    #[test]
    fn test_from_ics_missing_uid_falls_back_to_filename() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Anonymous\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let event = Event::from_ics(
            ics,
            String::new(),
            "/cal/abc123.ics".to_string(),
            "/cal/".to_string(),
        )
        .unwrap();

        assert_eq!(event.uid, "abc123");
    }

    #[test]
    fn test_from_ics_rejects_non_event_payload() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VTODO\r\n\
UID:todo-1\r\n\
SUMMARY:Not an event\r\n\
END:VTODO\r\n\
END:VCALENDAR\r\n";
        let err = Event::from_ics(ics, String::new(), String::new(), String::new());
        assert!(err.is_err());
    }

    #[test]
    fn test_to_ics_round_trips_through_from_ics() {
        let mut event = Event::new("Design review");
        event.description = Some("Bring mockups".to_string());
        event.location = Some("Studio".to_string());
        event.start = Some(Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap());
        event.end = Some(Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap());

        let ics = event.to_ics();
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("DTSTART:20250310T140000Z"));

        let parsed =
            Event::from_ics(&ics, String::new(), String::new(), String::new()).unwrap();
        assert_eq!(parsed.uid, event.uid);
        assert_eq!(parsed.summary, "Design review");
        assert_eq!(parsed.location.as_deref(), Some("Studio"));
        assert_eq!(parsed.start, event.start);
        assert_eq!(parsed.end, event.end);
        assert!(!parsed.all_day);
    }

    #[test]
    fn test_to_ics_all_day_uses_date_values() {
        let mut event = Event::new("Conference");
        event.all_day = true;
        event.start = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        event.end = Some(Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap());

        let ics = event.to_ics();
        assert!(ics.contains("DTSTART;VALUE=DATE:20250601"));
        assert!(ics.contains("DTEND;VALUE=DATE:20250603"));
    }
}
