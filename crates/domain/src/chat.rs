//! Negotiation threads and messages between vendors and shopkeepers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{MessageId, OrderId, ShopkeeperId, ThreadId, VendorId};

use crate::error::{DomainError, UnknownTag};

/// A conversation between one vendor and one shopkeeper.
///
/// At most one thread exists per (vendor, shopkeeper) pair; it is
/// created lazily when the first contact happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationThread {
    pub id: ThreadId,
    pub vendor_id: VendorId,
    pub shopkeeper_id: ShopkeeperId,
    pub created_at: DateTime<Utc>,
}

impl NegotiationThread {
    /// Creates a new thread for the pair, stamped with the current time.
    pub fn new(vendor_id: VendorId, shopkeeper_id: ShopkeeperId) -> Self {
        Self {
            id: ThreadId::new(),
            vendor_id,
            shopkeeper_id,
            created_at: Utc::now(),
        }
    }

    /// Returns true if `party` is one of the two participants.
    pub fn includes(&self, party: Party) -> bool {
        match party {
            Party::Vendor(id) => id == self.vendor_id,
            Party::Shopkeeper(id) => id == self.shopkeeper_id,
        }
    }
}

/// The sender of a message: one of the two sides of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Party {
    Vendor(VendorId),
    Shopkeeper(ShopkeeperId),
}

impl Party {
    /// Returns the role tag used in storage and transport.
    pub fn role(&self) -> &'static str {
        match self {
            Party::Vendor(_) => "vendor",
            Party::Shopkeeper(_) => "shopkeeper",
        }
    }

    /// Returns the underlying party UUID.
    pub fn id(&self) -> Uuid {
        match self {
            Party::Vendor(id) => id.as_uuid(),
            Party::Shopkeeper(id) => id.as_uuid(),
        }
    }

    /// Rebuilds a party from its stored role tag and UUID.
    pub fn from_parts(role: &str, id: Uuid) -> Result<Self, UnknownTag> {
        match role {
            "vendor" => Ok(Party::Vendor(VendorId::from_uuid(id))),
            "shopkeeper" => Ok(Party::Shopkeeper(ShopkeeperId::from_uuid(id))),
            other => Err(UnknownTag::new("party role", other)),
        }
    }
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.role(), self.id())
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Free-form text.
    Text,

    /// A quote that created a pending order.
    Estimation,

    /// An invoice that confirmed an order.
    Invoice,
}

impl MessageKind {
    /// Returns true if messages of this kind must reference an order.
    pub fn requires_order_ref(&self) -> bool {
        matches!(self, MessageKind::Estimation | MessageKind::Invoice)
    }

    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "Text",
            MessageKind::Estimation => "Estimation",
            MessageKind::Invoice => "Invoice",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Text" => Ok(MessageKind::Text),
            "Estimation" => Ok(MessageKind::Estimation),
            "Invoice" => Ok(MessageKind::Invoice),
            other => Err(UnknownTag::new("message kind", other)),
        }
    }
}

/// An immutable message appended to a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender: Party,
    pub kind: MessageKind,
    pub body: String,
    /// Required for estimation and invoice messages, optional for text.
    pub order_id: Option<OrderId>,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message, enforcing the order-reference rule.
    pub fn new(
        thread_id: ThreadId,
        sender: Party,
        kind: MessageKind,
        body: impl Into<String>,
        order_id: Option<OrderId>,
    ) -> Result<Self, DomainError> {
        let body = body.into();
        if kind.requires_order_ref() && order_id.is_none() {
            return Err(DomainError::OrderRefRequired { kind });
        }
        if kind == MessageKind::Text && body.trim().is_empty() {
            return Err(DomainError::EmptyMessageBody);
        }

        Ok(Self {
            id: MessageId::new(),
            thread_id,
            sender,
            kind,
            body,
            order_id,
            sent_at: Utc::now(),
        })
    }

    /// Creates a plain text message.
    pub fn text(
        thread_id: ThreadId,
        sender: Party,
        body: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Self::new(thread_id, sender, MessageKind::Text, body, None)
    }
}
