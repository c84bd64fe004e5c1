//! Decoding of upstream event payloads and formatting of the messages they produce.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use serde_with::{TimestampSeconds, formats::Flexible, serde_as};

use super::types::{Notification, Res};

/// Upstream tag for a presence change.
const PRESENCE_EVENT: &str = "pepito";

/// Upstream tag for a keep-alive.
const HEARTBEAT_EVENT: &str = "heartbeat";

/// Timestamp layout used in messages.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Types.

/// Which way the cat went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Direction {
    /// Upstream `in`.
    #[serde(rename = "in")]
    Arrived,
    /// Upstream `out`.
    #[serde(rename = "out")]
    Departed,
}

impl Direction {
    /// The word used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Arrived => "arrived",
            Direction::Departed => "departed",
        }
    }
}

/// A decoded upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PepitoEvent {
    /// The cat came in or went out.
    PresenceChange {
        /// Which way the cat went.
        direction: Direction,
        /// When it happened.
        time: DateTime<Utc>,
        /// The photo taken at the door, if the payload had one.
        image_url: Option<String>,
    },
    /// Keep-alive; never produces a notification.
    Heartbeat,
    /// Anything else.
    Unknown {
        /// The payload's `img` field, if it is a string.
        image_url: Option<String>,
    },
}

#[serde_as]
#[derive(Deserialize)]
struct PresencePayload {
    #[serde(rename = "type")]
    direction: Direction,
    #[serde_as(as = "TimestampSeconds<i64, Flexible>")]
    time: DateTime<Utc>,
    #[serde(default)]
    img: Option<String>,
}

impl PepitoEvent {
    /// Decode an already-parsed payload.
    ///
    /// Fails when the payload is not an object, or when a presence change is
    /// missing its `type` or `time`.
    pub fn from_value(value: &Value) -> Res<Self> {
        let object = value.as_object().ok_or_else(|| anyhow::anyhow!("Event payload is not a JSON object."))?;

        let event = match object.get("event").and_then(Value::as_str) {
            Some(PRESENCE_EVENT) => {
                let payload = PresencePayload::deserialize(value).map_err(|e| anyhow::anyhow!("Malformed presence event: {}", e))?;

                PepitoEvent::PresenceChange {
                    direction: payload.direction,
                    time: payload.time,
                    image_url: payload.img,
                }
            }
            Some(HEARTBEAT_EVENT) => PepitoEvent::Heartbeat,
            _ => PepitoEvent::Unknown {
                image_url: object.get("img").and_then(Value::as_str).map(str::to_owned),
            },
        };

        Ok(event)
    }

    /// The image attached to this event, if any.
    pub fn image_url(&self) -> Option<&str> {
        match self {
            PepitoEvent::PresenceChange { image_url, .. } | PepitoEvent::Unknown { image_url } => image_url.as_deref(),
            PepitoEvent::Heartbeat => None,
        }
    }

    /// The human readable message for this event, with timestamps rendered in `tz`.
    ///
    /// Heartbeats have no message.  Unknown events fall back to echoing the raw payload.
    pub fn message<Tz>(&self, raw: &str, tz: &Tz) -> Option<String>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        match self {
            PepitoEvent::PresenceChange { direction, time, image_url } => Some(format!(
                "Pepito is {} at {}\nImage: {}",
                direction.as_str(),
                time.with_timezone(tz).format(TIMESTAMP_FORMAT),
                image_url.as_deref().unwrap_or_default()
            )),
            PepitoEvent::Heartbeat => None,
            PepitoEvent::Unknown { .. } => Some(format!("Unknown event: {raw}")),
        }
    }
}

/// Turn a raw frame payload into the notification it should produce, if any.
///
/// Errors mean the payload was malformed.  `Ok(None)` means the event is valid
/// but is not delivered: heartbeats, and anything without an image.
pub fn notification_for<Tz>(raw: &str, tz: &Tz) -> Res<Option<Notification>>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let value: Value = serde_json::from_str(raw)?;
    let event = PepitoEvent::from_value(&value)?;

    let Some(text) = event.message(raw, tz) else {
        return Ok(None);
    };

    // Delivery requires an image; text-only notifications are dropped here.
    let Some(image_url) = event.image_url() else {
        return Ok(None);
    };

    Ok(Some(Notification {
        text,
        image_url: image_url.to_owned(),
    }))
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_arrival_in_utc() {
        let raw = r#"{"event":"pepito","type":"in","time":1700000000,"img":"https://img.example/1.jpg"}"#;

        let notification = notification_for(raw, &Utc).unwrap().unwrap();

        assert_eq!(notification.text, "Pepito is arrived at 2023-11-14 22:13:20\nImage: https://img.example/1.jpg");
        assert_eq!(notification.image_url, "https://img.example/1.jpg");
    }

    #[test]
    fn formats_departure() {
        let raw = r#"{"event":"pepito","type":"out","time":1700000000,"img":"https://img.example/2.jpg"}"#;

        let notification = notification_for(raw, &Utc).unwrap().unwrap();

        assert!(notification.text.starts_with("Pepito is departed at 2023-11-14 22:13:20"));
    }

    #[test]
    fn formats_in_the_given_time_zone() {
        let raw = r#"{"event":"pepito","type":"in","time":1700000000,"img":"x"}"#;
        let plus_two = chrono::FixedOffset::east_opt(2 * 3600).unwrap();

        let notification = notification_for(raw, &plus_two).unwrap().unwrap();

        assert!(notification.text.contains("2023-11-15 00:13:20"));
    }

    #[test]
    fn accepts_float_and_string_timestamps() {
        let float = serde_json::json!({"event": "pepito", "type": "in", "time": 1700000000.0, "img": "x"});
        let string = serde_json::json!({"event": "pepito", "type": "in", "time": "1700000000", "img": "x"});

        for value in [float, string] {
            let event = PepitoEvent::from_value(&value).unwrap();
            assert!(matches!(event, PepitoEvent::PresenceChange { time, .. } if time.timestamp() == 1_700_000_000));
        }
    }

    #[test]
    fn heartbeat_never_notifies() {
        assert_eq!(notification_for(r#"{"event":"heartbeat","time":1700000000}"#, &Utc).unwrap(), None);
        assert_eq!(notification_for(r#"{"event":"heartbeat","img":"https://img.example/1.jpg"}"#, &Utc).unwrap(), None);
    }

    #[test]
    fn presence_without_image_is_dropped() {
        let raw = r#"{"event":"pepito","type":"in","time":1700000000}"#;

        assert_eq!(notification_for(raw, &Utc).unwrap(), None);
    }

    #[test]
    fn unknown_event_without_image_is_dropped() {
        let raw = r#"{"event":"something"}"#;
        let value: Value = serde_json::from_str(raw).unwrap();

        let event = PepitoEvent::from_value(&value).unwrap();

        assert_eq!(event.message(raw, &Utc).as_deref(), Some(r#"Unknown event: {"event":"something"}"#));
        assert_eq!(notification_for(raw, &Utc).unwrap(), None);
    }

    #[test]
    fn unknown_event_with_image_is_delivered_with_fallback_text() {
        let raw = r#"{"event":"visitor","img":"https://img.example/3.jpg"}"#;

        let notification = notification_for(raw, &Utc).unwrap().unwrap();

        assert_eq!(notification.text, format!("Unknown event: {raw}"));
        assert_eq!(notification.image_url, "https://img.example/3.jpg");
    }

    #[test]
    fn missing_event_tag_is_unknown() {
        let value = serde_json::json!({"type": "in"});

        assert_eq!(PepitoEvent::from_value(&value).unwrap(), PepitoEvent::Unknown { image_url: None });
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(notification_for("not json", &Utc).is_err());
        assert!(notification_for("[1, 2, 3]", &Utc).is_err());
        assert!(notification_for(r#"{"event":"pepito","time":1700000000,"img":"x"}"#, &Utc).is_err());
        assert!(notification_for(r#"{"event":"pepito","type":"in","img":"x"}"#, &Utc).is_err());
        assert!(notification_for(r#"{"event":"pepito","type":"sideways","time":1,"img":"x"}"#, &Utc).is_err());
    }
}
