//! JSON wire format for alert messages.

use alerthub_common::NormalizedAlert;

pub fn encode_alert(alert: &NormalizedAlert) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(alert)
}

/// Decode a message body. Unknown extra fields are tolerated so producers
/// can grow the format without breaking consumers.
pub fn decode_alert(data: &[u8]) -> Result<NormalizedAlert, serde_json::Error> {
    serde_json::from_slice(data)
}
