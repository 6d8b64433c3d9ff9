//! Inbound webhook handler.
//!
//! Always returns 200 immediately after spawning the processing task — the
//! transport's webhook infrastructure does not usefully retry on 5xx, and
//! the state-machine handler plus provider call must never hold up the
//! response.

use axum::extract::State;
use axum::Form;
use serde::Deserialize;
use tracing::{error, info};

use crate::transport::normalize_address;
use crate::web::state::AppState;

/// Form-encoded inbound payload, field names per the transport's webhook
/// convention.
#[derive(Debug, Deserialize)]
pub struct InboundForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: String,
}

/// Receive an inbound message: POST /webhooks/inbound
pub async fn inbound(State(state): State<AppState>, Form(form): Form<InboundForm>) -> &'static str {
    let phone = normalize_address(&form.from);
    if phone.is_empty() {
        return "";
    }

    let body = form.body.trim().to_string();
    let sid = if form.message_sid.is_empty() {
        None
    } else {
        Some(form.message_sid.clone())
    };

    info!(phone = %phone, transport_sid = ?sid, "inbound webhook received");

    let processor = state.processor.clone();
    tokio::spawn(async move {
        if let Err(e) = processor
            .process_inbound(&phone, &body, sid.as_deref())
            .await
        {
            error!(phone = %phone, error = %e, "inbound processing failed");
        }
    });

    ""
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_form_decodes_transport_field_names() {
        let form: InboundForm = serde_urlencoded::from_str(
            "From=whatsapp%3A%2B14155550100&Body=hello&MessageSid=SM123",
        )
        .unwrap();
        assert_eq!(form.from, "whatsapp:+14155550100");
        assert_eq!(form.body, "hello");
        assert_eq!(form.message_sid, "SM123");
    }

    #[test]
    fn test_inbound_form_tolerates_missing_fields() {
        let form: InboundForm = serde_urlencoded::from_str("Body=hi").unwrap();
        assert!(form.from.is_empty());
        assert!(form.message_sid.is_empty());
    }
}
