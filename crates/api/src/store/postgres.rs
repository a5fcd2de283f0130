//! Postgres-backed chat stores

use async_trait::async_trait;
use pharmchat_shared::{
    ChatMessage, ConversationRoute, NewChatMessage, SenderKind, StaffAccount, StoreError,
};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{MessageService, StaffDirectory};

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_type: String,
    sender_id: Uuid,
    body: String,
    attachment_url: Option<String>,
    attachment_name: Option<String>,
    attachment_type: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let sender_type = row
            .sender_type
            .parse::<SenderKind>()
            .map_err(StoreError::Corrupt)?;

        Ok(ChatMessage {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_type,
            sender_id: row.sender_id,
            body: row.body,
            attachment_url: row.attachment_url,
            attachment_name: row.attachment_name,
            attachment_type: row.attachment_type,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl MessageService for PgMessageStore {
    async fn send_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO chat_messages
              (id, conversation_id, sender_type, sender_id, body,
               attachment_url, attachment_name, attachment_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, conversation_id, sender_type, sender_id, body,
                      attachment_url, attachment_name, attachment_type, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.conversation_id)
        .bind(message.sender_type.as_str())
        .bind(message.sender_id)
        .bind(&message.body)
        .bind(&message.attachment_url)
        .bind(&message.attachment_name)
        .bind(&message.attachment_type)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_conversations SET last_message_at = $2 WHERE id = $1")
            .bind(row.conversation_id)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        row.try_into()
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<ConversationRoute, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, Option<Uuid>)>(
            "SELECT organization_id, customer_id FROM chat_conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((tenant_id, customer_id)) => Ok(ConversationRoute {
                conversation_id,
                tenant_id,
                customer_id,
            }),
            None => Err(StoreError::NotFound(format!("conversation {conversation_id}"))),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgStaffDirectory {
    pool: PgPool,
}

impl PgStaffDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StaffRow {
    id: Uuid,
    organization_id: Uuid,
    role: String,
    is_active: bool,
}

#[async_trait]
impl StaffDirectory for PgStaffDirectory {
    async fn find_staff(&self, staff_id: Uuid) -> Result<Option<StaffAccount>, StoreError> {
        let row = sqlx::query_as::<_, StaffRow>(
            "SELECT id, organization_id, role, is_active FROM users WHERE id = $1",
        )
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StaffAccount {
            id: r.id,
            tenant_id: r.organization_id,
            role: r.role,
            is_active: r.is_active,
        }))
    }
}
