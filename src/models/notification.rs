use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ── Kinds ─────────────────────────────────────────────────────

/// Event kind of a notification, serialized as the backend's `type` string.
///
/// Unrecognized server types are kept in `Unknown` so a newer backend never
/// breaks deserialization of the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    RequestCreated,
    RequestApproved,
    RequestRejected,
    TicketAssigned,
    TicketApproved,
    TicketRejected,
    TicketCreated,
    TripCompleted,
    /// Synthesized on the client when an approved ticket is scheduled for today.
    TripReadyToday,
    #[default]
    General,
    Unknown(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::RequestCreated => "request_created",
            NotificationKind::RequestApproved => "request_approved",
            NotificationKind::RequestRejected => "request_rejected",
            NotificationKind::TicketAssigned => "ticket_assigned",
            NotificationKind::TicketApproved => "ticket_approved",
            NotificationKind::TicketRejected => "ticket_rejected",
            NotificationKind::TicketCreated => "ticket_created",
            NotificationKind::TripCompleted => "trip_completed",
            NotificationKind::TripReadyToday => "trip_ready_today",
            NotificationKind::General => "general",
            NotificationKind::Unknown(s) => s.as_str(),
        }
    }
}

impl From<String> for NotificationKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "request_created" => NotificationKind::RequestCreated,
            "request_approved" => NotificationKind::RequestApproved,
            "request_rejected" => NotificationKind::RequestRejected,
            "ticket_assigned" => NotificationKind::TicketAssigned,
            "ticket_approved" => NotificationKind::TicketApproved,
            "ticket_rejected" => NotificationKind::TicketRejected,
            "ticket_created" => NotificationKind::TicketCreated,
            "trip_completed" => NotificationKind::TripCompleted,
            "trip_ready_today" => NotificationKind::TripReadyToday,
            "general" => NotificationKind::General,
            _ => NotificationKind::Unknown(s),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Routing payload ───────────────────────────────────────────

/// Routing data attached to a notification.
///
/// The backend sends an untyped JSON object; only the keys that drive
/// deep-link routing are lifted into variants. Anything else is preserved
/// as `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum NotificationData {
    TripTicket { ticket_id: i64 },
    Ticket { ticket_id: i64 },
    /// Payload carrying only a `type` tag, e.g. `daily_trip_check`.
    Marker { kind: String },
    #[default]
    General,
    Unrecognized(Map<String, Value>),
}

impl NotificationData {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        if let Some(id) = map.get("trip_ticket_id").and_then(parse_id) {
            return NotificationData::TripTicket { ticket_id: id };
        }
        if let Some(id) = map.get("ticket_id").and_then(parse_id) {
            return NotificationData::Ticket { ticket_id: id };
        }

        let mut rest = map
            .iter()
            .filter(|(k, _)| k.as_str() != "notification_id");
        match (rest.next(), rest.next()) {
            (None, _) => NotificationData::General,
            (Some((k, Value::String(kind))), None) if k == "type" => NotificationData::Marker {
                kind: kind.clone(),
            },
            _ => NotificationData::Unrecognized(map.clone()),
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            NotificationData::TripTicket { ticket_id } => {
                map.insert("trip_ticket_id".into(), Value::from(*ticket_id));
            }
            NotificationData::Ticket { ticket_id } => {
                map.insert("ticket_id".into(), Value::from(*ticket_id));
            }
            NotificationData::Marker { kind } => {
                map.insert("type".into(), Value::from(kind.clone()));
            }
            NotificationData::General => {}
            NotificationData::Unrecognized(m) => map = m.clone(),
        }
        map
    }

    pub fn ticket_id(&self) -> Option<i64> {
        match self {
            NotificationData::TripTicket { ticket_id } | NotificationData::Ticket { ticket_id } => {
                Some(*ticket_id)
            }
            _ => None,
        }
    }
}

impl From<Value> for NotificationData {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => NotificationData::from_map(&map),
            // Laravel serializes an empty data array as `[]`
            _ => NotificationData::General,
        }
    }
}

impl From<NotificationData> for Value {
    fn from(data: NotificationData) -> Self {
        Value::Object(data.to_map())
    }
}

/// Accepts ids sent either as JSON numbers or numeric strings.
pub(crate) fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Data the platform hands back with a delivered or tapped notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    pub notification_id: Option<i64>,
    pub data: NotificationData,
}

impl PushPayload {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            notification_id: map.get("notification_id").and_then(parse_id),
            data: NotificationData::from_map(map),
        }
    }

    pub fn deep_link(&self) -> DeepLink {
        DeepLink::from(&self.data)
    }
}

// ── Deep links ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    TripTicket(i64),
    Ticket(i64),
    NotificationList,
}

impl DeepLink {
    pub fn path(&self) -> String {
        match self {
            DeepLink::TripTicket(id) => format!("/trip-tickets/{}", id),
            DeepLink::Ticket(id) => format!("/tickets/{}", id),
            DeepLink::NotificationList => "/notifications".to_string(),
        }
    }
}

impl From<&NotificationData> for DeepLink {
    fn from(data: &NotificationData) -> Self {
        match data {
            NotificationData::TripTicket { ticket_id } => DeepLink::TripTicket(*ticket_id),
            NotificationData::Ticket { ticket_id } => DeepLink::Ticket(*ticket_id),
            _ => DeepLink::NotificationList,
        }
    }
}

// ── Records ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(default)]
    pub data: NotificationData,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_optional_timestamp")]
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Prefix of the once-per-day dedup marker keys in durable storage.
pub const LOCAL_MARKER_PREFIX: &str = "local_notified:";

/// Calendar day encoded in a dedup marker key.
pub fn marker_day(key: &str) -> Option<NaiveDate> {
    let (_, day) = key.strip_prefix(LOCAL_MARKER_PREFIX)?.rsplit_once(':')?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Events the client detects on its own and turns into notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    TicketReadyToday {
        ticket_id: i64,
        ticket_number: Option<String>,
    },
}

impl LocalEvent {
    pub fn ticket_id(&self) -> i64 {
        match self {
            LocalEvent::TicketReadyToday { ticket_id, .. } => *ticket_id,
        }
    }

    /// Storage key of the once-per-day marker for this event.
    pub fn dedup_key(&self, day: NaiveDate) -> String {
        format!(
            "{}{}:{}",
            LOCAL_MARKER_PREFIX,
            self.ticket_id(),
            day.format("%Y-%m-%d")
        )
    }

    pub fn to_record(&self, now: DateTime<Utc>) -> NotificationRecord {
        match self {
            LocalEvent::TicketReadyToday {
                ticket_id,
                ticket_number,
            } => {
                let label = ticket_number
                    .clone()
                    .unwrap_or_else(|| format!("#{}", ticket_id));
                NotificationRecord {
                    id: now.timestamp_millis(),
                    kind: NotificationKind::TripReadyToday,
                    title: "Trip ready to start".to_string(),
                    message: format!("Trip ticket {} is scheduled for today.", label),
                    data: NotificationData::TripTicket {
                        ticket_id: *ticket_id,
                    },
                    created_at: now,
                    read_at: None,
                }
            }
        }
    }
}

// ── Timestamps ────────────────────────────────────────────────

/// Parses RFC 3339, `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s)))
}

fn lenient_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_backend_json() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": 7,
            "type": "ticket_approved",
            "title": "Approved",
            "message": "Your ticket was approved",
            "data": { "trip_ticket_id": "42", "type": "ticket_approved" },
            "read_at": null,
            "created_at": "2025-01-01T08:30:00.000000Z"
        }))
        .unwrap();

        assert_eq!(record.kind, NotificationKind::TicketApproved);
        assert_eq!(record.data, NotificationData::TripTicket { ticket_id: 42 });
        assert!(!record.is_read());
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let kind = NotificationKind::from("fuel_alert".to_string());
        assert_eq!(kind, NotificationKind::Unknown("fuel_alert".into()));
        assert_eq!(String::from(kind), "fuel_alert");
    }

    #[test]
    fn test_date_only_read_at_parses() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": 2,
            "type": "general",
            "title": "t",
            "message": "m",
            "data": [],
            "read_at": "2025-01-01",
            "created_at": "2024-12-31 23:00:00"
        }))
        .unwrap();

        assert!(record.is_read());
        assert_eq!(record.data, NotificationData::General);
        assert_eq!(
            record.read_at.unwrap().to_rfc3339(),
            "2025-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_invalid_timestamp_is_rejected() {
        let result: Result<NotificationRecord, _> = serde_json::from_value(json!({
            "id": 1, "type": "general", "created_at": "yesterday"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_marker_and_unrecognized_payloads() {
        let marker = json!({ "type": "daily_trip_check" });
        assert_eq!(
            NotificationData::from(marker),
            NotificationData::Marker { kind: "daily_trip_check".into() }
        );

        let other = json!({ "vehicle_id": 3, "type": "maintenance" });
        match NotificationData::from(other) {
            NotificationData::Unrecognized(map) => assert_eq!(map["vehicle_id"], 3),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_push_payload_routes_to_deep_link() {
        let map = json!({ "notification_id": 12, "ticket_id": 9 });
        let payload = PushPayload::from_map(map.as_object().unwrap());
        assert_eq!(payload.notification_id, Some(12));
        assert_eq!(payload.deep_link(), DeepLink::Ticket(9));
        assert_eq!(payload.deep_link().path(), "/tickets/9");

        let empty = PushPayload::from_map(&Map::new());
        assert_eq!(empty.deep_link(), DeepLink::NotificationList);
    }

    #[test]
    fn test_local_event_record_and_dedup_key() {
        let event = LocalEvent::TicketReadyToday {
            ticket_id: 5,
            ticket_number: Some("TT-0005".into()),
        };
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(event.dedup_key(day), "local_notified:5:2025-03-14");
        assert_eq!(marker_day(&event.dedup_key(day)), Some(day));
        assert_eq!(marker_day("push_token"), None);
        assert_eq!(marker_day("local_notified:5:not-a-day"), None);

        let now = Utc::now();
        let record = event.to_record(now);
        assert_eq!(record.id, now.timestamp_millis());
        assert_eq!(record.kind, NotificationKind::TripReadyToday);
        assert!(record.message.contains("TT-0005"));
        assert_eq!(record.data.ticket_id(), Some(5));
    }

    #[test]
    fn test_null_title_and_message_read_as_empty() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": 8, "type": "general", "title": null, "message": null,
            "data": null, "read_at": null, "created_at": "2025-01-01 08:30:00"
        }))
        .unwrap();
        assert_eq!(record.title, "");
        assert_eq!(record.message, "");
        assert!(!record.is_read());
    }
}
