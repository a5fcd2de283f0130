//! Collaborator interfaces consumed by the chat transport
//!
//! The transport never touches the database directly: message persistence,
//! conversation routing and staff lookups go through these traits so the
//! socket layer can be driven by any backing store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use pharmchat_shared::{ChatMessage, ConversationRoute, NewChatMessage, StaffAccount, StoreError};
use uuid::Uuid;

pub use memory::{MemoryMessageStore, MemoryStaffDirectory};
pub use postgres::{PgMessageStore, PgStaffDirectory};

/// Message persistence and conversation routing
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Persist a message and return the stored record
    async fn send_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError>;

    /// Resolve which tenant and customer a conversation belongs to
    async fn get_conversation(&self, conversation_id: Uuid) -> Result<ConversationRoute, StoreError>;

    /// Readiness check for health reporting
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Staff account lookups for the auth path
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn find_staff(&self, staff_id: Uuid) -> Result<Option<StaffAccount>, StoreError>;
}
