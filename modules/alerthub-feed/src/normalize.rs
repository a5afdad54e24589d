//! Alert Normalizer: one `NormalizedAlert` per language/category variant of
//! a CAP document.

use chrono::{DateTime, Utc};
use tracing::warn;

use alerthub_common::NormalizedAlert;

use crate::cap::{CapDocument, CapInfo};

/// The upstream encodes the zone name as the trailing `/`-separated segment
/// of the headline.
pub fn extract_area(headline: &str) -> Option<String> {
    let (_, area) = headline.rsplit_once('/')?;
    let area = area.trim();
    if area.is_empty() {
        None
    } else {
        Some(area.to_string())
    }
}

pub fn normalize(doc: &CapDocument) -> Vec<NormalizedAlert> {
    doc.infos
        .iter()
        .filter_map(|info| normalize_info(&doc.identifier, info))
        .collect()
}

fn normalize_info(identifier: &str, info: &CapInfo) -> Option<NormalizedAlert> {
    let headline = match &info.headline {
        Some(h) => h.clone(),
        None => {
            warn!(identifier, "Info block has no headline, skipping");
            return None;
        }
    };

    let category = info
        .awareness_type
        .clone()
        .or_else(|| info.event.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    // The hazard window: onset when given, otherwise the info's effective
    // time. The feed identity key hangs off this instant.
    let effective_from = parse_ts(identifier, info.onset.as_deref())
        .or_else(|| parse_ts(identifier, info.effective.as_deref()));
    let effective_until = parse_ts(identifier, info.expires.as_deref());

    let alert = NormalizedAlert {
        identifier: Some(identifier.to_string()),
        organization_name: None,
        language: info.language.clone(),
        category,
        area: extract_area(&headline),
        headline,
        description: info.description.clone(),
        instruction: info.instruction.clone(),
        effective_from,
        effective_until,
        severity: info.severity.clone(),
        urgency: info.urgency.clone(),
        certainty: info.certainty.clone(),
    }
    .normalized();

    if let Err(e) = alert.validate() {
        warn!(identifier, error = %e, "Invalid info block, skipping");
        return None;
    }
    Some(alert)
}

fn parse_ts(identifier: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(identifier, raw, error = %e, "Unparsable timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::parse_cap;

    #[test]
    fn area_is_trailing_headline_segment() {
        assert_eq!(
            extract_area("Mozni so mocni sunki vetra / SV Slovenija").as_deref(),
            Some("SV Slovenija")
        );
        assert_eq!(extract_area("No slash here"), None);
        assert_eq!(extract_area("Trailing slash /"), None);
    }

    #[test]
    fn one_alert_per_info_block() {
        let xml = r#"<?xml version="1.0"?>
<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
  <identifier>test-1</identifier>
  <info>
    <language>sl</language>
    <severity>Moderate</severity>
    <onset>2024-06-01T00:00:00+02:00</onset>
    <expires>2024-06-01T12:00:00+02:00</expires>
    <headline>Nevihte / JZ Slovenija</headline>
    <parameter><valueName>awareness_type</valueName><value>Thunderstorm</value></parameter>
  </info>
  <info>
    <language>en</language>
    <severity>Moderate</severity>
    <onset>2024-06-01T00:00:00+02:00</onset>
    <expires>2024-06-01T12:00:00+02:00</expires>
    <headline>Thunderstorms / SW Slovenia</headline>
    <parameter><valueName>awareness_type</valueName><value>Thunderstorm</value></parameter>
  </info>
</alert>"#;
        let alerts = normalize(&parse_cap(xml).unwrap());
        assert_eq!(alerts.len(), 2);

        let sl = &alerts[0];
        assert_eq!(sl.identifier.as_deref(), Some("test-1"));
        assert_eq!(sl.language.as_deref(), Some("sl"));
        assert_eq!(sl.category, "Thunderstorm");
        assert_eq!(sl.area.as_deref(), Some("JZ Slovenija"));
        assert!(sl.effective_from.is_some());
        assert!(sl.effective_until.is_some());
        // onset wins over effective for the window start
        assert_eq!(
            sl.effective_from.unwrap().to_rfc3339(),
            "2024-06-01T00:00:00+02:00"
                .parse::<DateTime<chrono::FixedOffset>>()
                .unwrap()
                .with_timezone(&Utc)
                .to_rfc3339()
        );
    }

    #[test]
    fn headlineless_block_is_skipped() {
        let xml = r#"<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
  <identifier>test-2</identifier>
  <info><language>sl</language><severity>Minor</severity></info>
</alert>"#;
        let alerts = normalize(&parse_cap(xml).unwrap());
        assert!(alerts.is_empty());
    }

    #[test]
    fn category_falls_back_to_event_tag() {
        let xml = r#"<alert xmlns="urn:oasis:names:tc:emergency:cap:1.2">
  <identifier>test-3</identifier>
  <info>
    <language>sl</language>
    <event>poplave</event>
    <headline>Poplave / Osrednja Slovenija</headline>
  </info>
</alert>"#;
        let alerts = normalize(&parse_cap(xml).unwrap());
        assert_eq!(alerts[0].category, "poplave");
    }
}
