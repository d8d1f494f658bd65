//! Qualification conversations and their messages.

use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::{map_write_error, ConstraintKind, DatabaseError, Result};
use crate::fixed_decimal::FixedDecimal;
use crate::lead::{get_lead, insert_lead};
use crate::models::{
    Conversation, ConversationStatus, Lead, LeadPriority, LeadSource, Message, MessageRole,
    NewConversation, NewLead, PropertyType, TransactionType,
};
use crate::property::DEFAULT_PAGE_SIZE;
use crate::validation::{validate_required, validate_score};

/// Filters for [`list_conversations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub lead_id: Option<String>,
    pub min_score: Option<i64>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for ConversationFilter {
    fn default() -> Self {
        Self {
            status: None,
            lead_id: None,
            min_score: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Open a conversation for a chat session.
///
/// Prospect phone and email formats are checked by the store.
pub async fn create_conversation(
    pool: &SqlitePool,
    new: &NewConversation,
) -> Result<Conversation> {
    validate_required("session_id", &new.session_id)?;

    let id = crate::new_id();
    sqlx::query(
        r#"
        INSERT INTO conversations (id, session_id, prospect_name, prospect_phone,
                                   prospect_email, agent_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.session_id)
    .bind(&new.prospect_name)
    .bind(&new.prospect_phone)
    .bind(&new.prospect_email)
    .bind(&new.agent_id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Conversation", &new.session_id, e))?;

    tracing::debug!(conversation_id = %id, session_id = %new.session_id, "Created conversation");
    get_conversation(pool, &id).await
}

/// Get a conversation by ID.
pub async fn get_conversation(pool: &SqlitePool, id: &str) -> Result<Conversation> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT * FROM conversations
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Conversation",
        id: id.to_string(),
    })
}

/// Get a conversation by its chat session ID.
pub async fn get_conversation_by_session(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Conversation> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT * FROM conversations
        WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Conversation",
        id: session_id.to_string(),
    })
}

/// List conversations, newest first.
pub async fn list_conversations(
    pool: &SqlitePool,
    filter: &ConversationFilter,
) -> Result<Vec<Conversation>> {
    let conversations = sqlx::query_as::<_, Conversation>(
        r#"
        SELECT * FROM conversations
        WHERE (?1 IS NULL OR status = ?1)
          AND (?2 IS NULL OR lead_id = ?2)
          AND (?3 IS NULL OR qualification_score >= ?3)
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?4 OFFSET ?5
        "#,
    )
    .bind(filter.status)
    .bind(&filter.lead_id)
    .bind(filter.min_score)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await?;

    Ok(conversations)
}

/// Conversations still in progress, newest first.
pub async fn active_conversations(pool: &SqlitePool, limit: i64) -> Result<Vec<Conversation>> {
    list_conversations(
        pool,
        &ConversationFilter {
            status: Some(ConversationStatus::Active),
            limit,
            ..Default::default()
        },
    )
    .await
}

/// Update every writable column of a conversation.
///
/// `message_count` is owned by [`add_message`] and is not written here.
pub async fn update_conversation(
    pool: &SqlitePool,
    conversation: &Conversation,
) -> Result<Conversation> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET session_id = ?, status = ?, prospect_name = ?, prospect_phone = ?,
            prospect_email = ?, extracted_criteria = ?, qualification_score = ?,
            ai_summary = ?, metadata = ?, lead_id = ?, agent_id = ?,
            duration_seconds = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&conversation.session_id)
    .bind(conversation.status)
    .bind(&conversation.prospect_name)
    .bind(&conversation.prospect_phone)
    .bind(&conversation.prospect_email)
    .bind(&conversation.extracted_criteria)
    .bind(conversation.qualification_score)
    .bind(&conversation.ai_summary)
    .bind(&conversation.metadata)
    .bind(&conversation.lead_id)
    .bind(&conversation.agent_id)
    .bind(conversation.duration_seconds)
    .bind(&conversation.completed_at)
    .bind(&conversation.id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Conversation", &conversation.session_id, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: conversation.id.clone(),
        });
    }

    get_conversation(pool, &conversation.id).await
}

/// Record the latest qualification score and extracted search criteria.
pub async fn update_qualification(
    pool: &SqlitePool,
    id: &str,
    score: i64,
    criteria: &Value,
) -> Result<Conversation> {
    validate_score(score)?;

    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET qualification_score = ?, extracted_criteria = ?
        WHERE id = ?
        "#,
    )
    .bind(score)
    .bind(criteria)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Conversation", id, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    get_conversation(pool, id).await
}

/// Close a conversation as completed, optionally linking the lead it produced.
pub async fn complete_conversation(
    pool: &SqlitePool,
    id: &str,
    lead_id: Option<&str>,
    summary: Option<&str>,
) -> Result<Conversation> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET status = ?,
            lead_id = COALESCE(?, lead_id),
            ai_summary = COALESCE(?, ai_summary),
            completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
            duration_seconds = MAX(0, CAST(strftime('%s', 'now') AS INTEGER) - CAST(strftime('%s', created_at) AS INTEGER))
        WHERE id = ?
        "#,
    )
    .bind(ConversationStatus::Completed)
    .bind(lead_id)
    .bind(summary)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Conversation", id, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    tracing::info!(conversation_id = %id, lead_id = ?lead_id, "Conversation completed");
    get_conversation(pool, id).await
}

/// Close a conversation the prospect walked away from.
pub async fn abandon_conversation(pool: &SqlitePool, id: &str) -> Result<Conversation> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET status = ?,
            duration_seconds = MAX(0, CAST(strftime('%s', 'now') AS INTEGER) - CAST(strftime('%s', created_at) AS INTEGER))
        WHERE id = ?
        "#,
    )
    .bind(ConversationStatus::Abandoned)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    get_conversation(pool, id).await
}

/// Attach a conversation to a lead.
pub async fn link_lead(pool: &SqlitePool, id: &str, lead_id: &str) -> Result<Conversation> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET lead_id = ?
        WHERE id = ?
        "#,
    )
    .bind(lead_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Conversation", id, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    get_conversation(pool, id).await
}

/// Build the lead a qualified conversation describes.
///
/// Search criteria are read from `extracted_criteria`: `transaction_type`,
/// `property_type`, `budget_min`, `budget_max`, `cities`, `neighborhoods`,
/// `bedrooms`, `surface_min`, `amenities`, `lead_quality`, `timeframe` and
/// `motivation`. Unknown or mistyped keys are ignored.
pub fn lead_from_conversation(conversation: &Conversation) -> Result<NewLead> {
    let phone = conversation.prospect_phone.clone().unwrap_or_default();
    validate_required("phone", &phone)?;

    let criteria = &conversation.extracted_criteria;
    let text = |key: &str| criteria.get(key).and_then(Value::as_str);
    let strings = |key: &str| -> Vec<String> {
        criteria
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let decimal = |key: &str| {
        criteria
            .get(key)
            .and_then(|v| serde_json::from_value::<FixedDecimal>(v.clone()).ok())
    };

    let mut names = conversation
        .prospect_name
        .as_deref()
        .unwrap_or_default()
        .split_whitespace();
    let first_name = names.next().unwrap_or("Prospect").to_string();
    let last_name = match names.collect::<Vec<_>>().join(" ") {
        rest if rest.is_empty() => "IA".to_string(),
        rest => rest,
    };

    let property_type = criteria.get("property_type").and_then(|v| match v {
        Value::Array(items) => items.first().and_then(Value::as_str),
        other => other.as_str(),
    });
    let amenities = strings("amenities");
    let has = |amenity: &str| amenities.iter().any(|a| a == amenity);

    let priority = if text("lead_quality") == Some("hot") {
        LeadPriority::High
    } else {
        LeadPriority::Medium
    };

    let score = conversation
        .qualification_score
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    let notes = format!(
        "Lead qualifié par Agent IA - Score: {}/100\nDélai: {}\nMotivation: {}",
        score,
        text("timeframe").unwrap_or("Non spécifié"),
        text("motivation").unwrap_or("Non spécifié"),
    );

    Ok(NewLead {
        agent_id: conversation.agent_id.clone(),
        first_name,
        last_name,
        phone,
        email: conversation.prospect_email.clone(),
        property_type: property_type.and_then(|t| PropertyType::from_str(t).ok()),
        transaction_type: text("transaction_type").and_then(|t| TransactionType::from_str(t).ok()),
        budget_min: decimal("budget_min"),
        budget_max: decimal("budget_max"),
        preferred_cities: strings("cities"),
        preferred_districts: strings("neighborhoods"),
        min_bedrooms: criteria.get("bedrooms").and_then(Value::as_i64),
        min_area: decimal("surface_min"),
        must_have_parking: has("parking"),
        must_have_garden: has("jardin"),
        must_have_pool: has("piscine"),
        must_have_elevator: has("ascenseur"),
        source: LeadSource::Chatbot,
        priority,
        notes: Some(notes),
        qualification_score: conversation.qualification_score,
        ai_summary: conversation.ai_summary.clone(),
        ai_extracted_criteria: Some(criteria.clone()),
        interested_properties: Vec::new(),
    })
}

/// Create a lead from a conversation and link the two, in one transaction.
///
/// Fails with `AlreadyExists` when the conversation already has a lead.
pub async fn create_lead_from_conversation(pool: &SqlitePool, conversation_id: &str) -> Result<Lead> {
    let conversation = get_conversation(pool, conversation_id).await?;
    if let Some(lead_id) = conversation.lead_id.as_deref() {
        return Err(DatabaseError::AlreadyExists {
            entity: "Lead",
            id: lead_id.to_string(),
        });
    }
    let new = lead_from_conversation(&conversation)?;

    let lead_id = crate::new_id();
    let mut tx = pool.begin().await?;

    insert_lead(&mut *tx, &lead_id, &new).await?;

    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET lead_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&lead_id)
    .bind(conversation_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: conversation_id.to_string(),
        });
    }

    tx.commit().await?;

    tracing::info!(conversation_id, lead_id = %lead_id, "Created lead from conversation");
    get_lead(pool, &lead_id).await
}

/// Conversation outcome figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationStatistics {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub abandoned: i64,
    /// Conversations linked to a lead.
    pub with_lead: i64,
    /// `with_lead` as a percentage of `completed`; zero when none completed.
    pub conversion_rate: f64,
}

/// Compute [`ConversationStatistics`].
pub async fn conversation_statistics(pool: &SqlitePool) -> Result<ConversationStatistics> {
    let (total, active, completed, abandoned, with_lead) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(status = 'active'), 0),
                   COALESCE(SUM(status = 'completed'), 0),
                   COALESCE(SUM(status = 'abandoned'), 0),
                   COUNT(lead_id)
            FROM conversations
            "#,
        )
        .fetch_one(pool)
        .await?;

    let conversion_rate = if completed > 0 {
        with_lead as f64 / completed as f64 * 100.0
    } else {
        0.0
    };

    Ok(ConversationStatistics {
        total,
        active,
        completed,
        abandoned,
        with_lead,
        conversion_rate,
    })
}

/// Delete a conversation and, through the cascade, its messages.
pub async fn delete_conversation(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM conversations
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    tracing::info!(conversation_id = %id, "Deleted conversation");
    Ok(())
}

/// Append a message and bump the conversation's message count.
pub async fn add_message(
    pool: &SqlitePool,
    conversation_id: &str,
    role: MessageRole,
    content: &str,
    metadata: &Value,
) -> Result<Message> {
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (conversation_id, role, content, metadata)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(conversation_id)
    .bind(role)
    .bind(content)
    .bind(metadata)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| missing_conversation(conversation_id, e))?;

    sqlx::query(
        r#"
        UPDATE conversations
        SET message_count = message_count + 1
        WHERE id = ?
        "#,
    )
    .bind(conversation_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(conversation_id, message_id = message.id, role = %role, "Added message");
    Ok(message)
}

fn missing_conversation(conversation_id: &str, e: sqlx::Error) -> DatabaseError {
    match map_write_error("Message", conversation_id, e) {
        DatabaseError::Constraint {
            kind: ConstraintKind::ForeignKey,
            ..
        } => DatabaseError::NotFound {
            entity: "Conversation",
            id: conversation_id.to_string(),
        },
        other => other,
    }
}

/// Messages of a conversation, oldest first.
pub async fn list_messages(
    pool: &SqlitePool,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<Message>> {
    // A negative LIMIT means no limit in SQLite.
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT * FROM messages
        WHERE conversation_id = ?
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(conversation_id)
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    Ok(messages)
}
