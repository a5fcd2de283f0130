//! In-memory chat stores for tests and local development

use async_trait::async_trait;
use pharmchat_shared::{
    ChatMessage, ConversationRoute, NewChatMessage, StaffAccount, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{MessageService, StaffDirectory};

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, ConversationRoute>,
    messages: Vec<ChatMessage>,
}

/// Message store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a conversation and return its id
    pub fn add_conversation(&self, tenant_id: Uuid, customer_id: Option<Uuid>) -> Uuid {
        let conversation_id = Uuid::new_v4();
        self.lock().conversations.insert(
            conversation_id,
            ConversationRoute {
                conversation_id,
                tenant_id,
                customer_id,
            },
        );
        conversation_id
    }

    /// Make subsequent `send_message` calls fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent conversation lookups and pings fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database("reads disabled".to_string()));
        }
        Ok(())
    }

    /// Snapshot of persisted messages in insertion order
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }
}

#[async_trait]
impl MessageService for MemoryMessageStore {
    async fn send_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("writes disabled".to_string()));
        }

        let mut inner = self.lock();
        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }

        let saved = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            sender_type: message.sender_type,
            sender_id: message.sender_id,
            body: message.body,
            attachment_url: message.attachment_url,
            attachment_name: message.attachment_name,
            attachment_type: message.attachment_type,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.messages.push(saved.clone());
        Ok(saved)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<ConversationRoute, StoreError> {
        self.check_reads()?;
        self.lock()
            .conversations
            .get(&conversation_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_reads()
    }
}

/// Staff directory backed by a fixed map
#[derive(Default)]
pub struct MemoryStaffDirectory {
    accounts: Mutex<HashMap<Uuid, StaffAccount>>,
}

impl MemoryStaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: StaffAccount) {
        self.accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account.id, account);
    }
}

#[async_trait]
impl StaffDirectory for MemoryStaffDirectory {
    async fn find_staff(&self, staff_id: Uuid) -> Result<Option<StaffAccount>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&staff_id)
            .cloned())
    }
}
