//! Minimal CAP 1.2 document reader.
//!
//! Pulls out the handful of fields the pipeline cares about: the alert
//! identifier plus one block per `<info>` element. Everything else in the
//! document is skipped.

use anyhow::{anyhow, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapDocument {
    pub identifier: String,
    pub sender: Option<String>,
    pub sent: Option<String>,
    pub status: Option<String>,
    pub infos: Vec<CapInfo>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapInfo {
    pub language: Option<String>,
    /// Raw `<event>` text.
    pub event: Option<String>,
    /// The `awareness_type` parameter, the upstream's stable category tag.
    pub awareness_type: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub effective: Option<String>,
    pub onset: Option<String>,
    pub expires: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
}

pub fn parse_cap(xml: &str) -> Result<CapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = CapDocument::default();
    let mut info: Option<CapInfo> = None;
    let mut in_area = false;
    let mut param_name: Option<String> = None;
    let mut param_value: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                text.clear();
                match local_name(e.name().as_ref()).as_str() {
                    "info" => info = Some(CapInfo::default()),
                    "area" => in_area = true,
                    "parameter" => {
                        param_name = None;
                        param_value = None;
                    }
                    _ => {}
                }
            }
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::End(e) => {
                let name = local_name(e.name().as_ref());
                let value = text.trim().to_string();
                text.clear();

                match name.as_str() {
                    "info" => {
                        if let Some(block) = info.take() {
                            doc.infos.push(block);
                        }
                    }
                    "area" => in_area = false,
                    "parameter" => {
                        if let Some(block) = info.as_mut() {
                            if param_name.as_deref() == Some("awareness_type") {
                                block.awareness_type = param_value.take();
                            }
                        }
                    }
                    // <area> carries its own <areaDesc>, <geocode> etc.;
                    // none of the info-level fields below live inside it.
                    _ if in_area => {}
                    field => match info.as_mut() {
                        Some(block) => match field {
                            "language" => block.language = non_empty(value),
                            "event" => block.event = non_empty(value),
                            "severity" => block.severity = non_empty(value),
                            "urgency" => block.urgency = non_empty(value),
                            "certainty" => block.certainty = non_empty(value),
                            "effective" => block.effective = non_empty(value),
                            "onset" => block.onset = non_empty(value),
                            "expires" => block.expires = non_empty(value),
                            "headline" => block.headline = non_empty(value),
                            "description" => block.description = non_empty(value),
                            "instruction" => block.instruction = non_empty(value),
                            "valueName" => param_name = non_empty(value),
                            "value" => param_value = non_empty(value),
                            _ => {}
                        },
                        None => match field {
                            "identifier" => doc.identifier = value,
                            "sender" => doc.sender = non_empty(value),
                            "sent" => doc.sent = non_empty(value),
                            "status" => doc.status = non_empty(value),
                            _ => {}
                        },
                    },
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if doc.identifier.is_empty() {
        return Err(anyhow!("CAP document has no identifier"));
    }
    Ok(doc)
}

fn local_name(qname: &[u8]) -> String {
    let name = match qname.iter().rposition(|b| *b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    };
    String::from_utf8_lossy(name).into_owned()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
