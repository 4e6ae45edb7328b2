//! Field extraction from portal lead payloads.
//!
//! Every portal ships its own JSON shape, so extraction is tolerant: a set of
//! known key spellings is probed at the top level and under a nested
//! `contact`/`lead` object. A payload that yields neither an email nor a
//! phone is low-confidence and gets ignored rather than turned into a lead.

use serde_json::Value;

use crate::shared::utils::normalize_phone;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedLead {
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub property_ref: Option<String>,
    pub message: Option<String>,
}

const NAME_KEYS: &[&str] = &["name", "contact_name", "customer_name", "lead_name", "full_name"];
const EMAIL_KEYS: &[&str] = &["email", "contact_email", "email_address"];
const PHONE_KEYS: &[&str] = &["phone", "phone_number", "mobile", "telephone", "cellphone"];
const PROPERTY_KEYS: &[&str] = &["property_id", "listing_id", "property_ref", "listing_ref", "reference"];
const MESSAGE_KEYS: &[&str] = &["message", "comments", "comment", "text", "description"];
const NESTED_KEYS: &[&str] = &["contact", "lead", "customer", "data"];

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn probe(payload: &Value, keys: &[&str]) -> Option<String> {
    let obj = payload.as_object()?;
    for key in keys {
        if let Some(found) = obj.get(*key) {
            match found {
                Value::String(s) => {
                    if let Some(v) = non_empty(s) {
                        return Some(v);
                    }
                }
                Value::Number(n) => return Some(n.to_string()),
                _ => {}
            }
        }
    }
    for nested in NESTED_KEYS {
        if let Some(inner) = obj.get(*nested) {
            if inner.is_object() {
                if let Some(v) = probe(inner, keys) {
                    return Some(v);
                }
            }
        }
    }
    None
}

pub fn map_payload(payload: &Value, default_country_code: &str) -> MappedLead {
    let phone = probe(payload, PHONE_KEYS)
        .and_then(|raw| normalize_phone(&raw, default_country_code));
    MappedLead {
        contact_name: probe(payload, NAME_KEYS),
        email: probe(payload, EMAIL_KEYS).filter(|e| e.contains('@')),
        phone,
        property_ref: probe(payload, PROPERTY_KEYS),
        message: probe(payload, MESSAGE_KEYS),
    }
}

/// A lead is only worth creating when we can reach the person back.
pub fn is_confident(mapped: &MappedLead) -> bool {
    mapped.email.is_some() || mapped.phone.is_some()
}

/// Caller-supplied dedupe key: the `Idempotency-Key` header wins, then the
/// payload's event id fields.
pub fn idempotency_key_from(header: Option<&str>, payload: &Value) -> Option<String> {
    if let Some(h) = header.and_then(non_empty) {
        return Some(h);
    }
    probe(payload, &["idempotency_key", "event_id", "delivery_id", "id"])
}

pub fn external_event_id_from(payload: &Value) -> Option<String> {
    probe(payload, &["event_id", "external_event_id", "id"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_flat_payload() {
        let payload = json!({
            "name": "Ana Souza",
            "email": "ana@example.com",
            "phone": "(11) 98765-4321",
            "listing_id": "ZP-1042",
            "message": "Interested in a visit"
        });
        let mapped = map_payload(&payload, "55");
        assert_eq!(mapped.contact_name.as_deref(), Some("Ana Souza"));
        assert_eq!(mapped.email.as_deref(), Some("ana@example.com"));
        assert_eq!(mapped.phone.as_deref(), Some("+5511987654321"));
        assert_eq!(mapped.property_ref.as_deref(), Some("ZP-1042"));
        assert!(is_confident(&mapped));
    }

    #[test]
    fn maps_nested_contact_object() {
        let payload = json!({
            "event_id": "evt-9",
            "contact": {"full_name": "Bruno Lima", "email_address": "bruno@example.com"},
            "data": {"reference": "AP-77"}
        });
        let mapped = map_payload(&payload, "55");
        assert_eq!(mapped.contact_name.as_deref(), Some("Bruno Lima"));
        assert_eq!(mapped.email.as_deref(), Some("bruno@example.com"));
        assert_eq!(mapped.property_ref.as_deref(), Some("AP-77"));
    }

    #[test]
    fn payload_without_contact_channel_is_low_confidence() {
        let payload = json!({"name": "Sem Contato", "message": "hi"});
        let mapped = map_payload(&payload, "55");
        assert!(!is_confident(&mapped));
    }

    #[test]
    fn invalid_email_is_dropped() {
        let payload = json!({"email": "not-an-email", "phone": "11 98765-4321"});
        let mapped = map_payload(&payload, "55");
        assert_eq!(mapped.email, None);
        assert!(is_confident(&mapped), "phone still carries confidence");
    }

    #[test]
    fn header_wins_over_payload_event_id() {
        let payload = json!({"event_id": "evt-1"});
        assert_eq!(
            idempotency_key_from(Some("key-A"), &payload).as_deref(),
            Some("key-A")
        );
        assert_eq!(
            idempotency_key_from(None, &payload).as_deref(),
            Some("evt-1")
        );
        assert_eq!(idempotency_key_from(Some("  "), &json!({})), None);
    }
}
