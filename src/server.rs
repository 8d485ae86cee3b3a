use crate::client::CaldavClient;
use crate::error::Error;
use crate::model::{CalendarListEntry, Event, parse_datetime_arg};
use crate::model::parser::is_date_only;

use chrono::{DateTime, Utc};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tool parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetEventsRequest {
    /// Calendar href or display name, as returned by get_calendars.
    pub calendar_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetEventByIdRequest {
    /// Calendar href or display name, as returned by get_calendars.
    pub calendar_id: String,
    /// UID of the event.
    pub event_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetEventsInRangeRequest {
    /// Calendar href or display name, as returned by get_calendars.
    pub calendar_id: String,
    /// Range start; RFC 3339, compact iCalendar or date-only.
    pub start: String,
    /// Range end; RFC 3339, compact iCalendar or date-only.
    pub end: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchEventsRequest {
    /// Text matched case-insensitively against summary, description and location.
    pub query: String,
    /// Calendar to search. When omitted, every calendar is searched.
    pub calendar_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreateEventRequest {
    /// Calendar href or display name, as returned by get_calendars.
    pub calendar_id: String,
    /// Event title.
    pub summary: String,
    /// Event start; RFC 3339, compact iCalendar or date-only.
    pub start: String,
    /// Event end; RFC 3339, compact iCalendar or date-only.
    pub end: String,
    /// Explicit UID; generated when omitted.
    pub uid: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct UpdateEventRequest {
    /// Calendar href or display name, as returned by get_calendars.
    pub calendar_id: String,
    /// UID of the event to update.
    pub event_id: String,
    /// New title. Omitted fields keep their current value.
    pub summary: Option<String>,
    /// New start; RFC 3339, compact iCalendar or date-only.
    pub start: Option<String>,
    /// New end; RFC 3339, compact iCalendar or date-only.
    pub end: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct DeleteEventRequest {
    /// Calendar href or display name, as returned by get_calendars.
    pub calendar_id: String,
    /// UID of the event to delete.
    pub event_id: String,
}

// ---------------------------------------------------------------------------
// Response payloads (shapes follow the wire format consumers already parse)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CalendarSummary {
    name: String,
    id: String,
}

#[derive(Debug, Serialize)]
struct CalendarsResponse {
    calendars: Vec<CalendarSummary>,
}

#[derive(Debug, Serialize)]
struct EventRecord {
    uid: String,
    summary: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    calendar_id: String,
}

impl EventRecord {
    fn from_event(event: &Event) -> Self {
        Self {
            uid: event.uid.clone(),
            summary: event.summary.clone(),
            start: event.start,
            end: event.end,
            all_day: event.all_day,
            location: event.location.clone(),
            description: event.description.clone(),
            calendar_id: event.calendar_href.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    calendar_id: String,
    count: usize,
    events: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    calendar_id: Option<String>,
    count: usize,
    events: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
struct EventResponse {
    event: EventRecord,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<EventRecord>,
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Err(McpError::internal_error(e.to_string(), None)),
    }
}

/// Operational failures become error results the assistant can read,
/// mirroring the `{"error": …}` payloads consumers already handle.
fn tool_failure(err: &Error) -> CallToolResult {
    CallToolResult::error(vec![Content::text(err.to_string())])
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>, McpError> {
    parse_datetime_arg(value)
        .map_err(|e| McpError::invalid_params(format!("{}: {}", field, e), None))
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// MCP server exposing a CalDAV account as a set of calendar tools.
#[derive(Clone)]
pub struct CaldavMcpServer {
    client: CaldavClient,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CaldavMcpServer {
    pub fn new(client: CaldavClient) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }

    /// Hrefs are addressed directly; anything else is matched against
    /// calendar display names (and hrefs) from the server.
    async fn resolve_calendar(&self, calendar_id: &str) -> Result<CalendarListEntry, Error> {
        if calendar_id.starts_with('/') {
            return Ok(CalendarListEntry {
                name: calendar_id.to_string(),
                href: calendar_id.to_string(),
            });
        }
        let calendars = self.client.list_calendars().await?;
        calendars
            .into_iter()
            .find(|c| c.name == calendar_id || c.href == calendar_id)
            .ok_or_else(|| Error::CalendarNotFound(calendar_id.to_string()))
    }

    #[tool(description = "List all calendars available to the configured account")]
    pub async fn get_calendars(&self) -> Result<CallToolResult, McpError> {
        match self.client.list_calendars().await {
            Ok(calendars) => json_result(&CalendarsResponse {
                calendars: calendars
                    .into_iter()
                    .map(|c| CalendarSummary {
                        name: c.name,
                        id: c.href,
                    })
                    .collect(),
            }),
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(description = "List all events in a calendar")]
    pub async fn get_events(
        &self,
        Parameters(req): Parameters<GetEventsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let calendar = match self.resolve_calendar(&req.calendar_id).await {
            Ok(c) => c,
            Err(e) => return Ok(tool_failure(&e)),
        };
        match self.client.events(&calendar.href).await {
            Ok(events) => json_result(&EventsResponse {
                calendar_id: calendar.href,
                count: events.len(),
                events: events.iter().map(EventRecord::from_event).collect(),
            }),
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(description = "Fetch a single event by its UID")]
    pub async fn get_event_by_id(
        &self,
        Parameters(req): Parameters<GetEventByIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let calendar = match self.resolve_calendar(&req.calendar_id).await {
            Ok(c) => c,
            Err(e) => return Ok(tool_failure(&e)),
        };
        match self.client.find_event(&calendar.href, &req.event_id).await {
            Ok(event) => json_result(&EventResponse {
                event: EventRecord::from_event(&event),
            }),
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(description = "List events overlapping a time range")]
    pub async fn get_events_in_range(
        &self,
        Parameters(req): Parameters<GetEventsInRangeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = parse_time("start", &req.start)?;
        let end = parse_time("end", &req.end)?;
        if end < start {
            return Err(McpError::invalid_params(
                "end must not be before start".to_string(),
                None,
            ));
        }
        let calendar = match self.resolve_calendar(&req.calendar_id).await {
            Ok(c) => c,
            Err(e) => return Ok(tool_failure(&e)),
        };
        match self
            .client
            .events_in_range(&calendar.href, start, end)
            .await
        {
            Ok(events) => json_result(&EventsResponse {
                calendar_id: calendar.href,
                count: events.len(),
                events: events.iter().map(EventRecord::from_event).collect(),
            }),
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(
        description = "Search events by text; searches every calendar unless calendar_id is given"
    )]
    pub async fn search_events(
        &self,
        Parameters(req): Parameters<SearchEventsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let fetched = match &req.calendar_id {
            Some(id) => match self.resolve_calendar(id).await {
                Ok(calendar) => self.client.events(&calendar.href).await,
                Err(e) => return Ok(tool_failure(&e)),
            },
            None => match self.client.list_calendars().await {
                Ok(calendars) => self.client.all_events(&calendars).await,
                Err(e) => return Ok(tool_failure(&e)),
            },
        };
        match fetched {
            Ok(events) => {
                let events: Vec<EventRecord> = events
                    .iter()
                    .filter(|e| e.matches_query(&req.query))
                    .map(EventRecord::from_event)
                    .collect();
                json_result(&SearchResponse {
                    query: req.query,
                    calendar_id: req.calendar_id,
                    count: events.len(),
                    events,
                })
            }
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(description = "Create a new event in a calendar")]
    pub async fn create_event(
        &self,
        Parameters(req): Parameters<CreateEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = parse_time("start", &req.start)?;
        let end = parse_time("end", &req.end)?;
        if end < start {
            return Err(McpError::invalid_params(
                "end must not be before start".to_string(),
                None,
            ));
        }
        let calendar = match self.resolve_calendar(&req.calendar_id).await {
            Ok(c) => c,
            Err(e) => return Ok(tool_failure(&e)),
        };

        let mut event = Event {
            uid: req
                .uid
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            summary: req.summary,
            description: req.description.filter(|d| !d.is_empty()),
            location: req.location.filter(|l| !l.is_empty()),
            start: Some(start),
            end: Some(end),
            all_day: is_date_only(&req.start) && is_date_only(&req.end),
            calendar_href: calendar.href,
            ..Event::default()
        };

        match self.client.create_event(&mut event).await {
            Ok(()) => json_result(&MessageResponse {
                message: format!("Event {} created", event.uid),
                event: Some(EventRecord::from_event(&event)),
            }),
            Err(Error::Conflict) => Ok(tool_failure(&Error::InvalidEventData(format!(
                "an event with UID {} already exists",
                event.uid
            )))),
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(description = "Update an existing event; omitted fields keep their current value")]
    pub async fn update_event(
        &self,
        Parameters(req): Parameters<UpdateEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = match &req.start {
            Some(v) => Some(parse_time("start", v)?),
            None => None,
        };
        let end = match &req.end {
            Some(v) => Some(parse_time("end", v)?),
            None => None,
        };

        let calendar = match self.resolve_calendar(&req.calendar_id).await {
            Ok(c) => c,
            Err(e) => return Ok(tool_failure(&e)),
        };
        let mut event = match self.client.find_event(&calendar.href, &req.event_id).await {
            Ok(event) => event,
            Err(e) => return Ok(tool_failure(&e)),
        };

        if let Some(summary) = req.summary {
            event.summary = summary;
        }
        if let Some(location) = req.location {
            event.location = Some(location).filter(|l| !l.is_empty());
        }
        if let Some(description) = req.description {
            event.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(start) = start {
            event.start = Some(start);
        }
        if let Some(end) = end {
            event.end = Some(end);
        }
        if req.start.is_some() || req.end.is_some() {
            event.all_day = req.start.as_deref().map(is_date_only).unwrap_or(event.all_day)
                && req.end.as_deref().map(is_date_only).unwrap_or(event.all_day);
        }

        match self.client.update_event(&event).await {
            Ok(()) => json_result(&MessageResponse {
                message: format!("Event {} updated", event.uid),
                event: Some(EventRecord::from_event(&event)),
            }),
            Err(e) => Ok(tool_failure(&e)),
        }
    }

    #[tool(description = "Delete an event from a calendar")]
    pub async fn delete_event(
        &self,
        Parameters(req): Parameters<DeleteEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        let calendar = match self.resolve_calendar(&req.calendar_id).await {
            Ok(c) => c,
            Err(e) => return Ok(tool_failure(&e)),
        };
        let event = match self.client.find_event(&calendar.href, &req.event_id).await {
            Ok(event) => event,
            Err(e) => return Ok(tool_failure(&e)),
        };
        match self.client.delete_event(&event).await {
            Ok(()) => json_result(&MessageResponse {
                message: format!("Event {} deleted successfully", event.uid),
                event: None,
            }),
            Err(e) => Ok(tool_failure(&e)),
        }
    }
}

#[tool_handler]
impl ServerHandler for CaldavMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Bridge to a CalDAV calendar account. Start with get_calendars to \
                 discover calendar ids, then list, search, create, update or delete \
                 events. Timestamps accept RFC 3339, compact iCalendar \
                 (YYYYMMDDTHHMMSSZ) and date-only forms."
                    .to_string(),
            ),
        }
    }
}
