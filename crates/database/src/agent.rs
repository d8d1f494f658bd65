//! Agent (`users` table) CRUD operations.

use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{map_write_error, DatabaseError, Result};
use crate::models::{Agent, AgentRole, AgentStatus, LeadStatus, NewAgent};
use crate::validation::{validate_email, validate_required};

/// Optional filters for [`list_agents`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFilter {
    pub role: Option<AgentRole>,
    pub status: Option<AgentStatus>,
    /// Only agents whose covered cities include this one.
    pub city: Option<String>,
}

/// Register a new agent.
pub async fn create_agent(pool: &SqlitePool, new: &NewAgent) -> Result<Agent> {
    validate_agent_fields(&new.email, &new.first_name, &new.last_name)?;

    let id = crate::new_id();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, phone, role,
                           bio, avatar_url, specialties, cities_covered)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.email)
    .bind(&new.password_hash)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.phone)
    .bind(new.role)
    .bind(&new.bio)
    .bind(&new.avatar_url)
    .bind(Json(&new.specialties))
    .bind(Json(&new.cities_covered))
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Agent", &new.email, e))?;

    tracing::debug!(agent_id = %id, email = %new.email, "Created agent");
    get_agent(pool, &id).await
}

fn validate_agent_fields(email: &str, first_name: &str, last_name: &str) -> Result<()> {
    validate_email(email)?;
    validate_required("first_name", first_name)?;
    validate_required("last_name", last_name)?;
    Ok(())
}

/// Get an agent by ID.
pub async fn get_agent(pool: &SqlitePool, id: &str) -> Result<Agent> {
    sqlx::query_as::<_, Agent>(
        r#"
        SELECT * FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Agent",
        id: id.to_string(),
    })
}

/// Get an agent by email.
pub async fn get_agent_by_email(pool: &SqlitePool, email: &str) -> Result<Agent> {
    sqlx::query_as::<_, Agent>(
        r#"
        SELECT * FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Agent",
        id: email.to_string(),
    })
}

/// List agents matching the filter, ordered by name.
pub async fn list_agents(pool: &SqlitePool, filter: &AgentFilter) -> Result<Vec<Agent>> {
    let agents = sqlx::query_as::<_, Agent>(
        r#"
        SELECT * FROM users
        WHERE (?1 IS NULL OR role = ?1)
          AND (?2 IS NULL OR status = ?2)
          AND (?3 IS NULL OR EXISTS (
                SELECT 1 FROM json_each(users.cities_covered) WHERE json_each.value = ?3
              ))
        ORDER BY last_name, first_name
        "#,
    )
    .bind(filter.role)
    .bind(filter.status)
    .bind(&filter.city)
    .fetch_all(pool)
    .await?;

    Ok(agents)
}

/// Update an agent's profile.
///
/// Counters, timestamps and the credential hash are not written here.
pub async fn update_agent(pool: &SqlitePool, agent: &Agent) -> Result<Agent> {
    validate_agent_fields(&agent.email, &agent.first_name, &agent.last_name)?;

    let result = sqlx::query(
        r#"
        UPDATE users
        SET email = ?, first_name = ?, last_name = ?, phone = ?, role = ?, status = ?,
            bio = ?, avatar_url = ?, specialties = ?, cities_covered = ?
        WHERE id = ?
        "#,
    )
    .bind(&agent.email)
    .bind(&agent.first_name)
    .bind(&agent.last_name)
    .bind(&agent.phone)
    .bind(agent.role)
    .bind(agent.status)
    .bind(&agent.bio)
    .bind(&agent.avatar_url)
    .bind(Json(&agent.specialties))
    .bind(Json(&agent.cities_covered))
    .bind(&agent.id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Agent", &agent.email, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Agent",
            id: agent.id.clone(),
        });
    }

    get_agent(pool, &agent.id).await
}

/// Change an agent's account status.
pub async fn set_agent_status(pool: &SqlitePool, id: &str, status: AgentStatus) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET status = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Agent",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Record a successful login.
pub async fn record_login(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET last_login_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Agent",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Delete an agent by ID.
///
/// Properties, leads and conversations referencing the agent are kept with
/// their `agent_id` cleared.
pub async fn delete_agent(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Agent",
            id: id.to_string(),
        });
    }

    tracing::info!(agent_id = %id, "Deleted agent");
    Ok(())
}

/// Recompute an agent's counters from the rows that reference it.
///
/// The store never maintains these counters on its own.
pub async fn recompute_counters(pool: &SqlitePool, id: &str) -> Result<Agent> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET properties_count = (SELECT COUNT(*) FROM properties WHERE agent_id = users.id),
            leads_count = (SELECT COUNT(*) FROM leads WHERE agent_id = users.id),
            conversions_count = (
                SELECT COUNT(*) FROM leads WHERE agent_id = users.id AND status = ?
            )
        WHERE id = ?
        "#,
    )
    .bind(LeadStatus::Converted)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Agent",
            id: id.to_string(),
        });
    }

    get_agent(pool, id).await
}

/// Count agents grouped by role.
pub async fn count_agents_by_role(pool: &SqlitePool) -> Result<Vec<(AgentRole, i64)>> {
    let rows = sqlx::query_as::<_, (AgentRole, i64)>(
        r#"
        SELECT role, COUNT(*) as count
        FROM users
        GROUP BY role
        ORDER BY count DESC, role
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_agent, test_db};
    use crate::{ConstraintKind, ValidationError};

    #[tokio::test]
    async fn test_agent_crud() {
        let db = test_db().await;

        // Create
        let agent = create_agent(
            db.pool(),
            &NewAgent {
                email: "amina@agence.ma".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Amina".to_string(),
                last_name: "Benali".to_string(),
                specialties: vec!["villas".to_string(), "riads".to_string()],
                cities_covered: vec!["Marrakech".to_string(), "Essaouira".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(agent.role, AgentRole::Agent);
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.properties_count, 0);
        assert_eq!(agent.created_at, agent.updated_at);

        // Read
        let fetched = get_agent_by_email(db.pool(), "amina@agence.ma").await.unwrap();
        assert_eq!(fetched, agent);
        assert_eq!(fetched.cities_covered, vec!["Marrakech", "Essaouira"]);

        // Update
        let updated = update_agent(
            db.pool(),
            &Agent {
                role: AgentRole::Manager,
                bio: Some("Spécialiste du haut de gamme".to_string()),
                ..agent.clone()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.role, AgentRole::Manager);
        assert!(updated.updated_at >= agent.updated_at);

        // Delete
        delete_agent(db.pool(), &agent.id).await.unwrap();
        let result = get_agent(db.pool(), &agent.id).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = test_db().await;
        test_agent(&db, "dup@agence.ma").await;

        let result = create_agent(
            db.pool(),
            &NewAgent {
                email: "dup@agence.ma".to_string(),
                password_hash: "other".to_string(),
                first_name: "Other".to_string(),
                last_name: "Agent".to_string(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(DatabaseError::AlreadyExists { entity: "Agent", .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_role_rejected_by_store() {
        let db = test_db().await;
        let agent = test_agent(&db, "role@agence.ma").await;

        let err = sqlx::query("UPDATE users SET role = 'owner' WHERE id = ?")
            .bind(&agent.id)
            .execute(db.pool())
            .await
            .map_err(|e| map_write_error("Agent", &agent.id, e))
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));

        let err = sqlx::query("UPDATE users SET status = 'banned' WHERE id = ?")
            .bind(&agent.id)
            .execute(db.pool())
            .await
            .map_err(|e| map_write_error("Agent", &agent.id, e))
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));
    }

    #[tokio::test]
    async fn test_negative_counter_rejected_by_store() {
        let db = test_db().await;
        let agent = test_agent(&db, "count@agence.ma").await;

        let result = sqlx::query("UPDATE users SET leads_count = -1 WHERE id = ?")
            .bind(&agent.id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let db = test_db().await;
        let result = create_agent(
            db.pool(),
            &NewAgent {
                email: "not-an-email".to_string(),
                password_hash: "hash".to_string(),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_requires_names() {
        let db = test_db().await;
        let agent = test_agent(&db, "names@agence.ma").await;

        for blanked in [
            Agent {
                first_name: "  ".to_string(),
                ..agent.clone()
            },
            Agent {
                last_name: String::new(),
                ..agent.clone()
            },
        ] {
            let result = update_agent(db.pool(), &blanked).await;
            assert!(matches!(
                result,
                Err(DatabaseError::Validation(ValidationError::Empty(_)))
            ));
        }

        let unchanged = get_agent(db.pool(), &agent.id).await.unwrap();
        assert_eq!(unchanged.first_name, "Youssef");
        assert_eq!(unchanged.last_name, "Alaoui");
    }

    #[tokio::test]
    async fn test_list_agents_filters() {
        let db = test_db().await;
        let casa = create_agent(
            db.pool(),
            &NewAgent {
                email: "casa@agence.ma".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Karim".to_string(),
                last_name: "Idrissi".to_string(),
                cities_covered: vec!["Casablanca".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let admin = create_agent(
            db.pool(),
            &NewAgent {
                email: "admin@agence.ma".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Salma".to_string(),
                last_name: "Amrani".to_string(),
                role: AgentRole::Admin,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let all = list_agents(db.pool(), &AgentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, admin.id); // Amrani < Idrissi

        let in_casa = list_agents(
            db.pool(),
            &AgentFilter {
                city: Some("Casablanca".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(in_casa.len(), 1);
        assert_eq!(in_casa[0].id, casa.id);

        let admins = list_agents(
            db.pool(),
            &AgentFilter {
                role: Some(AgentRole::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(admins.len(), 1);

        set_agent_status(db.pool(), &casa.id, AgentStatus::Suspended)
            .await
            .unwrap();
        let suspended = list_agents(
            db.pool(),
            &AgentFilter {
                status: Some(AgentStatus::Suspended),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(suspended.len(), 1);
        assert_eq!(suspended[0].id, casa.id);

        let counts = count_agents_by_role(db.pool()).await.unwrap();
        assert_eq!(counts, vec![(AgentRole::Admin, 1), (AgentRole::Agent, 1)]);
    }

    #[tokio::test]
    async fn test_record_login() {
        let db = test_db().await;
        let agent = test_agent(&db, "login@agence.ma").await;
        assert!(agent.last_login_at.is_none());

        record_login(db.pool(), &agent.id).await.unwrap();
        let agent = get_agent(db.pool(), &agent.id).await.unwrap();
        assert!(agent.last_login_at.is_some());

        let missing = record_login(db.pool(), "missing").await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_recompute_counters() {
        use crate::test_support::test_lead;
        use crate::{lead, property, FixedDecimal, NewProperty, PropertyType, TransactionType};

        let db = test_db().await;
        let agent = test_agent(&db, "counters@agence.ma").await;

        let mut listing = NewProperty::new(
            "Appartement centre-ville",
            PropertyType::Apartment,
            TransactionType::Rental,
            "Rabat",
            FixedDecimal::from_hundredths(800_000),
            FixedDecimal::from_hundredths(9_000),
        );
        listing.agent_id = Some(agent.id.clone());
        property::create_property(db.pool(), &listing).await.unwrap();

        let mut first = test_lead("Omar", "0612345678");
        first.agent_id = Some(agent.id.clone());
        let first = lead::create_lead(db.pool(), &first).await.unwrap();
        let mut second = test_lead("Nadia", "0712345678");
        second.agent_id = Some(agent.id.clone());
        lead::create_lead(db.pool(), &second).await.unwrap();
        lead::convert_lead(db.pool(), &first.id).await.unwrap();

        // Counters are not maintained by the store.
        let stale = get_agent(db.pool(), &agent.id).await.unwrap();
        assert_eq!(stale.leads_count, 0);

        let fresh = recompute_counters(db.pool(), &agent.id).await.unwrap();
        assert_eq!(fresh.properties_count, 1);
        assert_eq!(fresh.leads_count, 2);
        assert_eq!(fresh.conversions_count, 1);
    }
}
