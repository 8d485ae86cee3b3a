use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{CalendarListEntry, Event};

// Libdav imports
use libdav::caldav::{FindCalendarHomeSet, FindCalendars};
use libdav::dav::{Delete, GetProperty, PutResource, WebDavClient, WebDavError};
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use libdav::{CalDavClient, names};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use http::{Method, StatusCode, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tower_http::auth::AddAuthorization;
use tracing::{debug, warn};

type HttpsClient = AddAuthorization<
    Client<
        hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
        String,
    >,
>;

const EVENT_CONTENT_TYPE: &str = "text/calendar; charset=utf-8; component=VEVENT";

/// CalDAV client carrying HTTP Basic credentials over rustls.
///
/// All operations talk to the server directly; nothing is cached locally.
#[derive(Clone)]
pub struct CaldavClient {
    client: CalDavClient<HttpsClient>,
}

impl CaldavClient {
    pub fn new(config: &Config) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::Config("no CalDAV server URL configured".to_string()));
        }

        let uri: Uri = config
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| Error::InvalidUrl(e.to_string()))?;

        let https_connector = if config.allow_insecure_certs {
            let tls_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();

            HttpsConnectorBuilder::new()
                .with_tls_config(tls_config)
                .https_or_http()
                .enable_http1()
                .build()
        } else {
            let mut root_store = rustls::RootCertStore::empty();
            let result = rustls_native_certs::load_native_certs();
            root_store.add_parsable_certificates(result.certs);

            if root_store.is_empty() {
                return Err(Error::Tls(
                    "no valid system certificates found".to_string(),
                ));
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            HttpsConnectorBuilder::new()
                .with_tls_config(tls_config)
                .https_or_http()
                .enable_http1()
                .build()
        };

        let http_client = Client::builder(TokioExecutor::new()).build(https_connector);
        let auth_client =
            AddAuthorization::basic(http_client, &config.username, &config.password);
        let webdav = WebDavClient::new(uri, auth_client);

        Ok(Self {
            client: CalDavClient::new(webdav),
        })
    }

    /// Verify the server is reachable with the configured credentials.
    pub async fn connect(&self) -> Result<()> {
        self.client
            .find_current_user_principal()
            .await
            .map_err(|e| Error::Dav(format!("principal discovery: {:?}", e)))?;
        Ok(())
    }

    pub async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>> {
        let principal = self
            .client
            .find_current_user_principal()
            .await
            .map_err(|e| Error::Dav(format!("principal discovery: {:?}", e)))?
            .ok_or_else(|| {
                Error::Dav("server reported no current-user-principal".to_string())
            })?;

        let home_set_resp = self
            .client
            .request(FindCalendarHomeSet::new(&principal))
            .await
            .map_err(|e| dav_error("calendar-home-set", e))?;
        let home_url = home_set_resp
            .home_sets
            .first()
            .ok_or_else(|| Error::Dav("no calendar-home-set".to_string()))?;

        let cals_resp = self
            .client
            .request(FindCalendars::new(home_url))
            .await
            .map_err(|e| dav_error("calendar listing", e))?;

        let mut calendars = Vec::new();
        for col in cals_resp.calendars {
            let name = self
                .client
                .request(GetProperty::new(&col.href, &names::DISPLAY_NAME))
                .await
                .ok()
                .and_then(|r| r.value)
                .unwrap_or_else(|| col.href.clone());

            calendars.push(CalendarListEntry {
                name,
                href: col.href,
            });
        }
        Ok(calendars)
    }

    /// All events in a calendar collection.
    pub async fn events(&self, calendar_href: &str) -> Result<Vec<Event>> {
        self.query_events(calendar_href, None).await
    }

    /// Events overlapping `[start, end]`, filtered server-side via a
    /// `calendar-query` time-range.
    pub async fn events_in_range(
        &self,
        calendar_href: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let range = (
            start.format("%Y%m%dT%H%M%SZ").to_string(),
            end.format("%Y%m%dT%H%M%SZ").to_string(),
        );
        self.query_events(calendar_href, Some(range)).await
    }

    async fn query_events(
        &self,
        calendar_href: &str,
        range: Option<(String, String)>,
    ) -> Result<Vec<Event>> {
        let resp = self
            .client
            .request(CalendarQuery {
                collection_href: calendar_href,
                range,
            })
            .await
            .map_err(|e| dav_error("calendar-query", e))?;

        let mut events = Vec::new();
        for resource in resp.resources {
            match Event::from_ics(
                &resource.data,
                resource.etag.unwrap_or_default(),
                resource.href.clone(),
                calendar_href.to_string(),
            ) {
                Ok(event) => events.push(event),
                Err(e) => warn!(href = %resource.href, "skipping unparsable resource: {}", e),
            }
        }
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.summary.cmp(&b.summary)));
        Ok(events)
    }

    pub async fn find_event(&self, calendar_href: &str, uid: &str) -> Result<Event> {
        let events = self.events(calendar_href).await?;
        events
            .into_iter()
            .find(|e| e.uid == uid)
            .ok_or_else(|| Error::EventNotFound(uid.to_string()))
    }

    /// Events across several calendars, fetched with bounded concurrency.
    /// A calendar that fails to list is skipped with a warning.
    pub async fn all_events(&self, calendars: &[CalendarListEntry]) -> Result<Vec<Event>> {
        let hrefs: Vec<String> = calendars.iter().map(|c| c.href.clone()).collect();
        let futures = hrefs.into_iter().map(|href| {
            let client = self.clone();
            async move { (href.clone(), client.events(&href).await) }
        });
        let mut stream = stream::iter(futures).buffer_unordered(4);
        let mut all = Vec::new();
        while let Some((href, res)) = stream.next().await {
            match res {
                Ok(events) => all.extend(events),
                Err(e) => warn!(calendar = %href, "skipping calendar: {}", e),
            }
        }
        all.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.summary.cmp(&b.summary)));
        Ok(all)
    }

    /// Store a new event. Fills in `href` from the calendar and UID; the
    /// `If-None-Match: *` precondition refuses to overwrite an existing UID.
    pub async fn create_event(&self, event: &mut Event) -> Result<()> {
        let filename = format!("{}.ics", event.uid);
        event.href = if event.calendar_href.ends_with('/') {
            format!("{}{}", event.calendar_href, filename)
        } else {
            format!("{}/{}", event.calendar_href, filename)
        };

        let ics = event.to_ics();
        match self
            .client
            .request(PutResource::new(&event.href).create(ics, "text/calendar"))
            .await
        {
            Ok(_) => {
                debug!(href = %event.href, "created event");
                Ok(())
            }
            Err(WebDavError::BadStatusCode(StatusCode::PRECONDITION_FAILED))
            | Err(WebDavError::PreconditionFailed(_)) => Err(Error::Conflict),
            Err(e) => Err(dav_error("create", e)),
        }
    }

    /// Conditional update; the stored etag must still match on the server.
    pub async fn update_event(&self, event: &Event) -> Result<()> {
        let ics = event.to_ics();
        match self
            .client
            .request(PutResource::new(&event.href).update(ics, EVENT_CONTENT_TYPE, &event.etag))
            .await
        {
            Ok(_) => Ok(()),
            Err(WebDavError::BadStatusCode(StatusCode::PRECONDITION_FAILED))
            | Err(WebDavError::PreconditionFailed(_)) => Err(Error::Conflict),
            Err(WebDavError::BadStatusCode(StatusCode::NOT_FOUND)) => {
                Err(Error::EventNotFound(event.uid.clone()))
            }
            Err(e) => Err(dav_error("update", e)),
        }
    }

    /// Conditional delete. A resource that is already gone counts as deleted.
    pub async fn delete_event(&self, event: &Event) -> Result<()> {
        let result = if event.etag.is_empty() {
            self.client.request(Delete::new(&event.href)).await
        } else {
            self.client
                .request(Delete::new(&event.href).with_etag(&event.etag))
                .await
        };
        match result {
            Ok(_) => Ok(()),
            Err(WebDavError::BadStatusCode(StatusCode::NOT_FOUND)) => Ok(()),
            Err(WebDavError::BadStatusCode(StatusCode::PRECONDITION_FAILED))
            | Err(WebDavError::PreconditionFailed(_)) => Err(Error::Conflict),
            Err(e) => Err(dav_error("delete", e)),
        }
    }
}

fn dav_error<E: std::fmt::Debug>(op: &str, err: WebDavError<E>) -> Error {
    match err {
        WebDavError::BadStatusCode(StatusCode::UNAUTHORIZED) => Error::Unauthorized,
        other => Error::Dav(format!("{}: {:?}", op, other)),
    }
}

// ---------------------------------------------------------------------------
// calendar-query REPORT
// ---------------------------------------------------------------------------

/// CalDAV `calendar-query` REPORT over a collection, optionally restricted
/// to a time range. Fetches etag and calendar data in one round trip.
struct CalendarQuery<'a> {
    collection_href: &'a str,
    range: Option<(String, String)>,
}

/// One fetched resource with its ICS payload.
#[derive(Debug)]
pub struct EventResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

#[derive(Debug)]
struct CalendarQueryResponse {
    resources: Vec<EventResource>,
}

impl DavRequest for CalendarQuery<'_> {
    type Response = CalendarQueryResponse;
    type ParseError = ParseResponseError;
    type Error<E> = WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        let time_range = match &self.range {
            Some((start, end)) => {
                format!(r#"<C:time-range start="{}" end="{}"/>"#, start, end)
            }
            None => String::new(),
        };
        let body = format!(
            r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">{}</C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
            time_range
        );

        Ok(PreparedRequest {
            method: Method::from_bytes(b"REPORT")?,
            path: self.collection_href.to_string(),
            body,
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }
        Ok(CalendarQueryResponse {
            resources: parse_multistatus(body)?,
        })
    }
}

/// Pull `href`/`getetag`/`calendar-data` triples out of a 207 multistatus.
fn parse_multistatus(body: &[u8]) -> std::result::Result<Vec<EventResource>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;

    let mut resources = Vec::new();
    for response in doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
    {
        let find_text = |tag: &str| {
            response
                .descendants()
                .find(|n| n.tag_name().name() == tag)
                .and_then(|n| n.text())
                .map(|s| s.to_string())
        };

        let Some(href) = find_text("href") else {
            continue;
        };
        // Responses without calendar-data are the collection itself.
        let Some(data) = find_text("calendar-data") else {
            continue;
        };
        resources.push(EventResource {
            href,
            etag: find_text("getetag"),
            data,
        });
    }
    Ok(resources)
}

#[derive(Debug)]
struct NoVerifier;
impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _: &rustls::pki_types::CertificateDer<'_>,
        _: &[rustls::pki_types::CertificateDer<'_>],
        _: &rustls::pki_types::ServerName<'_>,
        _: &[u8],
        _: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }
    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &rustls::pki_types::CertificateDer<'_>,
        _: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }
    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &rustls::pki_types::CertificateDer<'_>,
        _: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }
    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        use rustls::SignatureScheme::*;
        vec![
            RSA_PKCS1_SHA256,
            RSA_PKCS1_SHA384,
            RSA_PKCS1_SHA512,
            ECDSA_NISTP256_SHA256,
            RSA_PSS_SHA256,
            ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multistatus_extracts_resources() {
        let body = br#"<?xml version="1.0" encoding="utf-8"?>
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/cal/</href>
    <propstat><prop/><status>HTTP/1.1 200 OK</status></propstat>
  </response>
  <response>
    <href>/cal/evt-1.ics</href>
    <propstat>
      <prop>
        <getetag>"etag-1"</getetag>
        <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:evt-1
SUMMARY:Hello
END:VEVENT
END:VCALENDAR
</C:calendar-data>
      </prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

        let resources = parse_multistatus(body).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].href, "/cal/evt-1.ics");
        assert_eq!(resources[0].etag.as_deref(), Some("\"etag-1\""));
        assert!(resources[0].data.contains("SUMMARY:Hello"));
    }

    #[test]
    fn test_calendar_query_body_carries_time_range() {
        let query = CalendarQuery {
            collection_href: "/cal/",
            range: Some((
                "20250101T000000Z".to_string(),
                "20250201T000000Z".to_string(),
            )),
        };
        let prepared = query.prepare_request().unwrap();
        assert_eq!(prepared.method, Method::from_bytes(b"REPORT").unwrap());
        assert_eq!(prepared.path, "/cal/");
        assert!(prepared.body.contains(r#"start="20250101T000000Z""#));
        assert!(prepared.body.contains(r#"end="20250201T000000Z""#));

        let unbounded = CalendarQuery {
            collection_href: "/cal/",
            range: None,
        };
        let prepared = unbounded.prepare_request().unwrap();
        assert!(!prepared.body.contains("time-range"));
    }
}
