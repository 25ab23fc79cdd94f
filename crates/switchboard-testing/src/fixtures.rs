//! Builders for contacts and outbound messages with sensible defaults.

use chrono::{DateTime, Utc};
use switchboard_core::{
    Contact, InstanceId, InstanceSettings, MessageBody, MessageId, OutboundMessage, QuickMessage,
};
use uuid::Uuid;

/// Builder for test contacts.
#[derive(Debug, Clone)]
pub struct ContactBuilder {
    contact: Contact,
}

impl ContactBuilder {
    /// A `cliente` contact of instance `I1`.
    pub fn new() -> Self {
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        Self {
            contact: Contact {
                id: format!("{suffix}@s.whatsapp.net"),
                instance_id: InstanceId::from("I1"),
                name: format!("Contato {suffix}"),
                phone: "+5511999990000".to_string(),
                contact_type: "cliente".to_string(),
                unread_count: 0,
                last_message_at: None,
            },
        }
    }

    /// Sets the owning instance.
    #[must_use]
    pub fn instance(mut self, instance_id: impl Into<InstanceId>) -> Self {
        self.contact.instance_id = instance_id.into();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.contact.name = name.into();
        self
    }

    /// Sets the CRM classification.
    #[must_use]
    pub fn contact_type(mut self, contact_type: impl Into<String>) -> Self {
        self.contact.contact_type = contact_type.into();
        self
    }

    /// Sets the unread count.
    #[must_use]
    pub fn unread(mut self, count: u32) -> Self {
        self.contact.unread_count = count;
        self
    }

    /// Finishes the contact.
    pub fn build(self) -> Contact {
        self.contact
    }
}

impl Default for ContactBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for outbound messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: OutboundMessage,
}

impl MessageBuilder {
    /// A text message from instance `I1`.
    pub fn new() -> Self {
        Self {
            message: OutboundMessage {
                id: MessageId::new(),
                instance_id: InstanceId::from("I1"),
                recipient: "5511999990000@s.whatsapp.net".to_string(),
                body: MessageBody::Text { text: "Olá!".to_string() },
                created_at: Utc::now(),
            },
        }
    }

    /// Sets the sending instance.
    #[must_use]
    pub fn instance(mut self, instance_id: impl Into<InstanceId>) -> Self {
        self.message.instance_id = instance_id.into();
        self
    }

    /// Sets the text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.message.body = MessageBody::Text { text: text.into() };
        self
    }

    /// Sets a media body.
    #[must_use]
    pub fn media(mut self, url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.message.body =
            MessageBody::Media { url: url.into(), mime_type: mime_type.into(), caption: None };
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.message.created_at = created_at;
        self
    }

    /// Finishes the message.
    pub fn build(self) -> OutboundMessage {
        self.message
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for `instance_id` with auto-reply disabled.
pub fn instance_settings(instance_id: impl Into<InstanceId>) -> InstanceSettings {
    let instance_id = instance_id.into();
    InstanceSettings {
        display_name: format!("Instância {instance_id}"),
        instance_id,
        webhook_url: None,
        auto_reply_enabled: false,
        away_message: None,
        updated_at: Utc::now(),
    }
}

/// A quick reply with the given shortcut.
pub fn quick_message(shortcut: &str, content: &str) -> QuickMessage {
    QuickMessage { id: Uuid::new_v4(), shortcut: shortcut.to_string(), content: content.to_string() }
}
