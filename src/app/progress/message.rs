use serde_json::{Map, Value};
use thiserror::Error;

use super::super::media::{HistoryKey, MediaKind};

const EVENT_FAMILY: &str = "PLAYER_EVENT";
const ENDED_EVENT: &str = "ended";

/// Validated progress update posted by an embedded player.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayerEvent {
    pub(crate) key: HistoryKey,
    pub(crate) current_time: f64,
    pub(crate) duration: f64,
    pub(crate) ended: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum Violation {
    #[error("payload is not JSON")]
    NotJson,
    #[error("envelope is not an object")]
    NotAnObject,
    #[error("unrecognized event family")]
    WrongFamily,
    #[error("envelope has no data object")]
    MissingData,
    #[error("field '{0}' is missing or malformed")]
    BadField(&'static str),
}

/// Parses one raw message from the player channel. Anything that is not a
/// well-formed `PLAYER_EVENT` envelope yields `None`; the channel is open to
/// arbitrary senders so nothing here may panic or propagate.
pub(crate) fn parse_player_message(raw: &str) -> Option<PlayerEvent> {
    match parse_envelope(raw) {
        Ok(event) => Some(event),
        Err(violation) => {
            tracing::trace!(%violation, "discarded player message");
            None
        }
    }
}

fn parse_envelope(raw: &str) -> Result<PlayerEvent, Violation> {
    let mut value: Value = serde_json::from_str(raw.trim()).map_err(|_| Violation::NotJson)?;
    // Some players post the envelope as a JSON-encoded string.
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner).map_err(|_| Violation::NotJson)?;
    }

    let envelope = value.as_object().ok_or(Violation::NotAnObject)?;
    if envelope.get("type").and_then(Value::as_str) != Some(EVENT_FAMILY) {
        return Err(Violation::WrongFamily);
    }
    let data = envelope
        .get("data")
        .and_then(Value::as_object)
        .ok_or(Violation::MissingData)?;

    let current_time = finite_number(data, "currentTime")?;
    let duration = finite_number(data, "duration")?;
    let id = identifier(data)?;
    let kind = data
        .get("mediaType")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<MediaKind>().ok())
        .ok_or(Violation::BadField("mediaType"))?;
    let season = optional_ordinal(data, "season")?;
    let episode = optional_ordinal(data, "episode")?;
    let ended = data.get("event").and_then(Value::as_str) == Some(ENDED_EVENT);

    Ok(PlayerEvent {
        key: HistoryKey::new(kind, id, season, episode),
        current_time,
        duration,
        ended,
    })
}

fn finite_number(data: &Map<String, Value>, field: &'static str) -> Result<f64, Violation> {
    data.get(field)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .ok_or(Violation::BadField(field))
}

fn identifier(data: &Map<String, Value>) -> Result<String, Violation> {
    let id = match data.get("id") {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => match number.as_u64() {
            Some(id) => id.to_string(),
            // Integral floats such as `42.0` name the same title.
            None => number
                .as_f64()
                .filter(|id| id.is_finite() && *id >= 0.0 && id.fract() == 0.0 && *id < 1e15)
                .map(|id| format!("{id:.0}"))
                .ok_or(Violation::BadField("id"))?,
        },
        _ => return Err(Violation::BadField("id")),
    };
    if id.is_empty() {
        return Err(Violation::BadField("id"));
    }
    Ok(id)
}

/// Season/episode may be absent; when present they must be integers ≥ 1,
/// either as JSON numbers or numeric strings.
fn optional_ordinal(
    data: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u32>, Violation> {
    let parsed = match data.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|value| *value >= 1)
        .and_then(|value| u32::try_from(value).ok())
        .map(Some)
        .ok_or(Violation::BadField(field))
}
