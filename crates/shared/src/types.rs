//! Common types used across PharmChat

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Identity
// =============================================================================

/// Which side of a conversation a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Staff,
    Customer,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::Staff => "staff",
            SenderKind::Customer => "customer",
        }
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(SenderKind::Staff),
            "customer" => Ok(SenderKind::Customer),
            other => Err(format!("unknown sender kind: {other}")),
        }
    }
}

/// Routing identity of one live chat connection
///
/// A connection is either a staff member of a tenant or an anonymous chat
/// customer of a tenant, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIdentity {
    Staff {
        tenant_id: Uuid,
        staff_id: Uuid,
        role: String,
    },
    Customer {
        tenant_id: Uuid,
        customer_id: Uuid,
    },
}

impl ClientIdentity {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            ClientIdentity::Staff { tenant_id, .. } | ClientIdentity::Customer { tenant_id, .. } => {
                *tenant_id
            }
        }
    }

    pub fn staff_id(&self) -> Option<Uuid> {
        match self {
            ClientIdentity::Staff { staff_id, .. } => Some(*staff_id),
            ClientIdentity::Customer { .. } => None,
        }
    }

    pub fn customer_id(&self) -> Option<Uuid> {
        match self {
            ClientIdentity::Customer { customer_id, .. } => Some(*customer_id),
            ClientIdentity::Staff { .. } => None,
        }
    }

    pub fn sender_kind(&self) -> SenderKind {
        match self {
            ClientIdentity::Staff { .. } => SenderKind::Staff,
            ClientIdentity::Customer { .. } => SenderKind::Customer,
        }
    }

    /// Staff id or customer id, whichever this identity carries
    pub fn sender_id(&self) -> Uuid {
        match self {
            ClientIdentity::Staff { staff_id, .. } => *staff_id,
            ClientIdentity::Customer { customer_id, .. } => *customer_id,
        }
    }
}

// =============================================================================
// Chat Records
// =============================================================================

/// Where a conversation's traffic is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationRoute {
    pub conversation_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
}

impl ConversationRoute {
    /// Whether the given identity takes part in this conversation
    pub fn admits(&self, identity: &ClientIdentity) -> bool {
        match identity {
            ClientIdentity::Staff { tenant_id, .. } => *tenant_id == self.tenant_id,
            ClientIdentity::Customer { customer_id, .. } => self.customer_id == Some(*customer_id),
        }
    }
}

/// A message about to be persisted
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub conversation_id: Uuid,
    pub sender_type: SenderKind,
    pub sender_id: Uuid,
    pub body: String,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_type: Option<String>,
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_type: SenderKind,
    pub sender_id: Uuid,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Staff account as seen by the chat auth path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffAccount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
    pub is_active: bool,
}
