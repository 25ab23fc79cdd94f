//! Domain models and strongly-typed identifiers.
//!
//! Covers the records the inbox caches (instance settings, quick replies,
//! contacts) and the outbound messages the retry queue re-sends.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a connected WhatsApp instance.
///
/// Instance identifiers are assigned by the messaging gateway and are opaque
/// strings, so they are not parsed or validated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Creates an instance identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Strongly-typed outbound message identifier.
///
/// Keys the retry queue: at most one queue item exists per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-instance configuration loaded from the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Instance these settings belong to.
    pub instance_id: InstanceId,
    /// Name shown in the inbox header.
    pub display_name: String,
    /// Gateway webhook receiving inbound messages, if configured.
    pub webhook_url: Option<String>,
    /// Whether the greeting auto-reply is enabled.
    pub auto_reply_enabled: bool,
    /// Auto-reply text sent outside business hours.
    pub away_message: Option<String>,
    /// Last modification time in the backing store.
    pub updated_at: DateTime<Utc>,
}

/// Canned reply available from the composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickMessage {
    /// Row identifier.
    pub id: Uuid,
    /// Shortcut typed after `/` in the composer.
    pub shortcut: String,
    /// Reply text.
    pub content: String,
}

/// Conversation partner listed in the inbox sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Gateway chat identifier (phone JID).
    pub id: String,
    /// Instance the conversation belongs to.
    pub instance_id: InstanceId,
    /// Display name.
    pub name: String,
    /// Phone number in E.164 form.
    pub phone: String,
    /// CRM classification, e.g. `cliente` or `lead`.
    pub contact_type: String,
    /// Unread inbound messages.
    pub unread_count: u32,
    /// Time of the most recent message in either direction.
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Filters applied to a contact-list query.
///
/// Backed by an ordered map so the digest is independent of the order in
/// which filters were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilters(BTreeMap<String, String>);

impl ContactFilters {
    /// Creates an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a filter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Returns `true` when no filter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value for a filter field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Canonical `field=value&field=value` rendering, sorted by field.
    ///
    /// Fields and values are percent-encoded, so distinct filter sets never
    /// share a digest and the digest never contains `:`.
    pub fn digest(&self) -> String {
        self.0
            .iter()
            .map(|(field, value)| {
                format!("{}={}", urlencoding::encode(field), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Returns whether a contact satisfies every filter.
    ///
    /// `type` matches the contact classification and `search` matches the
    /// name or phone case-insensitively. Unknown fields are ignored.
    pub fn matches(&self, contact: &Contact) -> bool {
        self.0.iter().all(|(field, value)| match field.as_str() {
            "type" => contact.contact_type == *value,
            "search" => {
                let needle = value.to_lowercase();
                contact.name.to_lowercase().contains(&needle) || contact.phone.contains(&needle)
            },
            _ => true,
        })
    }
}

/// Content of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// Plain text.
    Text {
        /// Message text
        text: String,
    },
    /// Media attachment referenced by URL.
    Media {
        /// Public URL of the file
        url: String,
        /// MIME type of the file
        mime_type: String,
        /// Optional caption
        caption: Option<String>,
    },
}

/// Message the inbox hands to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Unique message ID.
    pub id: MessageId,
    /// Sending instance.
    pub instance_id: InstanceId,
    /// Recipient chat identifier.
    pub recipient: String,
    /// Message content.
    pub body: MessageBody,
    /// When the user composed the message.
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Creates a text message.
    pub fn text(
        instance_id: InstanceId,
        recipient: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            instance_id,
            recipient: recipient.into(),
            body: MessageBody::Text { text: text.into() },
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: &str, contact_type: &str) -> Contact {
        Contact {
            id: "5511999990000@s.whatsapp.net".to_string(),
            instance_id: InstanceId::from("I1"),
            name: name.to_string(),
            phone: "+5511999990000".to_string(),
            contact_type: contact_type.to_string(),
            unread_count: 0,
            last_message_at: None,
        }
    }

    #[test]
    fn filter_digest_is_order_independent() {
        let a = ContactFilters::new().with("type", "cliente").with("search", "ana");
        let b = ContactFilters::new().with("search", "ana").with("type", "cliente");

        assert_eq!(a.digest(), "search=ana&type=cliente");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn filter_digest_escapes_separators() {
        let split = ContactFilters::new().with("search", "ana").with("type", "lead");
        let typed = ContactFilters::new().with("search", "ana&type=lead");

        assert_ne!(split.digest(), typed.digest());
        assert_eq!(typed.digest(), "search=ana%26type%3Dlead");
        assert!(!ContactFilters::new().with("search", "10:30").digest().contains(':'));
    }

    #[test]
    fn empty_filters_have_empty_digest() {
        assert!(ContactFilters::new().is_empty());
        assert_eq!(ContactFilters::new().digest(), "");
    }

    #[test]
    fn filters_match_type_and_search() {
        let filters = ContactFilters::new().with("type", "cliente").with("search", "MARIA");

        assert!(filters.matches(&contact("Maria Souza", "cliente")));
        assert!(!filters.matches(&contact("Maria Souza", "lead")));
        assert!(!filters.matches(&contact("João", "cliente")));
    }

    #[test]
    fn message_body_serializes_with_tag() {
        let body = MessageBody::Text { text: "olá".to_string() };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "olá");
    }
}
