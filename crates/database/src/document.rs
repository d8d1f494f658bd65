//! Single-document form of a conversation.
//!
//! A [`ConversationDocument`] folds a conversation row, its prospect
//! contact details and every message into one JSON value. It is the
//! exchange format for chat front-ends that keep the whole dialogue as one
//! state blob. Rows remain the stored form; documents are produced by
//! [`export_document`] and written back by [`import_document`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::conversation::{get_conversation, list_messages};
use crate::error::{map_write_error, Result};
use crate::models::{Conversation, ConversationStatus, MessageRole};
use crate::validation::{validate_required, validate_score, validate_timestamp};

/// A whole conversation as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub session_id: String,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default)]
    pub qualification_score: Option<i64>,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub contact: DocumentContact,
    #[serde(default = "empty_object")]
    pub extracted_criteria: Value,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    #[serde(default)]
    pub messages: Vec<DocumentMessage>,
    /// Start of the conversation; import uses the current time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Prospect contact details captured during the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Build the document form of a stored conversation.
pub async fn export_document(pool: &SqlitePool, conversation_id: &str) -> Result<ConversationDocument> {
    let conversation = get_conversation(pool, conversation_id).await?;
    let messages = list_messages(pool, conversation_id, None).await?;

    Ok(ConversationDocument {
        session_id: conversation.session_id,
        status: conversation.status,
        qualification_score: conversation.qualification_score,
        lead_id: conversation.lead_id,
        contact: DocumentContact {
            name: conversation.prospect_name,
            phone: conversation.prospect_phone,
            email: conversation.prospect_email,
        },
        extracted_criteria: conversation.extracted_criteria,
        summary: conversation.ai_summary,
        metadata: conversation.metadata,
        messages: messages
            .into_iter()
            .map(|m| DocumentMessage {
                role: m.role,
                content: m.content,
                metadata: m.metadata,
                timestamp: Some(m.created_at),
            })
            .collect(),
        started_at: Some(conversation.created_at),
        completed_at: conversation.completed_at,
    })
}

/// Store a document as a new conversation with its messages.
///
/// Timestamps must be `YYYY-MM-DDTHH:MM:SS.sssZ`. Runs in one
/// transaction: if any row is rejected nothing is written.
pub async fn import_document(pool: &SqlitePool, document: &ConversationDocument) -> Result<Conversation> {
    validate_required("session_id", &document.session_id)?;
    if let Some(score) = document.qualification_score {
        validate_score(score)?;
    }
    if let Some(started_at) = &document.started_at {
        validate_timestamp("started_at", started_at)?;
    }
    if let Some(completed_at) = &document.completed_at {
        validate_timestamp("completed_at", completed_at)?;
    }
    for (i, message) in document.messages.iter().enumerate() {
        if let Some(timestamp) = &message.timestamp {
            validate_timestamp(&format!("messages[{i}].timestamp"), timestamp)?;
        }
    }

    let id = crate::new_id();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO conversations (
            id, session_id, status, prospect_name, prospect_phone, prospect_email,
            extracted_criteria, qualification_score, ai_summary, metadata, lead_id,
            message_count, duration_seconds, created_at, completed_at
        )
        VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
            CASE WHEN ?14 IS NULL THEN NULL
                 ELSE MAX(0, CAST(strftime('%s', ?14) AS INTEGER)
                            - CAST(strftime('%s', COALESCE(?13, 'now')) AS INTEGER))
            END,
            COALESCE(?13, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            ?14
        )
        "#,
    )
    .bind(&id)
    .bind(&document.session_id)
    .bind(document.status)
    .bind(&document.contact.name)
    .bind(&document.contact.phone)
    .bind(&document.contact.email)
    .bind(&document.extracted_criteria)
    .bind(document.qualification_score)
    .bind(&document.summary)
    .bind(&document.metadata)
    .bind(&document.lead_id)
    .bind(document.messages.len() as i64)
    .bind(&document.started_at)
    .bind(&document.completed_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_write_error("Conversation", &document.session_id, e))?;

    for message in &document.messages {
        sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, metadata, created_at)
            VALUES (?, ?, ?, ?, COALESCE(?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
            "#,
        )
        .bind(&id)
        .bind(message.role)
        .bind(&message.content)
        .bind(&message.metadata)
        .bind(&message.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error("Message", &document.session_id, e))?;
    }

    tx.commit().await?;

    tracing::info!(
        conversation_id = %id,
        session_id = %document.session_id,
        messages = document.messages.len(),
        "Imported conversation document"
    );
    get_conversation(pool, &id).await
}
