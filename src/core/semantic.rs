//! Best-effort facing-angle extraction used to drive synthetic pointer input
//! during replay. This is a heuristic, not a protocol decoder.

use serde_json::Value;

use crate::core::payload::WirePayload;

/// Text-record fields consulted for a rotation value, in order.
pub const ROTATION_FIELDS: [&str; 2] = ["rotation", "r"];

const FULL_TURN: f64 = 360.0;

/// Derives a facing angle in degrees from a payload.
///
/// Binary payloads of at least two bytes read their first two bytes as a
/// big-endian `u16`; text payloads are parsed as a record carrying a numeric
/// rotation field. Blobs and everything else yield `None`.
pub fn extract_angle(payload: &WirePayload) -> Option<f64> {
    match payload {
        WirePayload::Text(text) => angle_from_text(text),
        WirePayload::Buffer(_) | WirePayload::View(_) => {
            let bytes = payload.as_bytes()?;
            let [high, low, ..] = bytes else {
                return None;
            };
            let packed = u16::from_be_bytes([*high, *low]);
            Some(f64::from(packed % 360))
        }
        WirePayload::Blob(_) => None,
    }
}

fn angle_from_text(text: &str) -> Option<f64> {
    let record = serde_json::from_str::<Value>(text).ok()?;
    let fields = record.as_object()?;
    let rotation = ROTATION_FIELDS
        .iter()
        .find_map(|field| fields.get(*field))?
        .as_f64()?;

    rotation.is_finite().then(|| rotation % FULL_TURN)
}
