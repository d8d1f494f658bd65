//! Lead (prospect) CRUD operations.

use sqlx::types::Json;
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::error::{map_write_error, DatabaseError, Result};
use crate::models::{Lead, LeadPriority, LeadSource, LeadStatus, NewLead};
use crate::property::DEFAULT_PAGE_SIZE;
use crate::validation::validate_required;

/// Filters for [`list_leads`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub priority: Option<LeadPriority>,
    pub min_score: Option<i64>,
    pub agent_id: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            status: None,
            source: None,
            priority: None,
            min_score: None,
            agent_id: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Capture a new lead.
pub async fn create_lead(pool: &SqlitePool, new: &NewLead) -> Result<Lead> {
    let id = crate::new_id();
    insert_lead(pool, &id, new).await?;

    tracing::debug!(lead_id = %id, source = %new.source, "Created lead");
    get_lead(pool, &id).await
}

/// Validate and insert a lead row under `id` on any executor.
pub(crate) async fn insert_lead<'e, E>(executor: E, id: &str, new: &NewLead) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    validate_required("phone", &new.phone)?;
    validate_required("first_name", &new.first_name)?;

    sqlx::query(
        r#"
        INSERT INTO leads (
            id, agent_id, first_name, last_name, phone, email, property_type, transaction_type,
            budget_min, budget_max, preferred_cities, preferred_districts, min_bedrooms, min_area,
            must_have_parking, must_have_garden, must_have_pool, must_have_elevator,
            source, priority, notes, qualification_score, ai_summary, ai_extracted_criteria,
            interested_properties
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&new.agent_id)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.phone)
    .bind(&new.email)
    .bind(new.property_type)
    .bind(new.transaction_type)
    .bind(new.budget_min)
    .bind(new.budget_max)
    .bind(Json(&new.preferred_cities))
    .bind(Json(&new.preferred_districts))
    .bind(new.min_bedrooms)
    .bind(new.min_area)
    .bind(new.must_have_parking)
    .bind(new.must_have_garden)
    .bind(new.must_have_pool)
    .bind(new.must_have_elevator)
    .bind(new.source)
    .bind(new.priority)
    .bind(&new.notes)
    .bind(new.qualification_score)
    .bind(&new.ai_summary)
    .bind(&new.ai_extracted_criteria)
    .bind(Json(&new.interested_properties))
    .execute(executor)
    .await
    .map_err(|e| map_write_error("Lead", id, e))?;

    Ok(())
}

/// Get a lead by ID.
pub async fn get_lead(pool: &SqlitePool, id: &str) -> Result<Lead> {
    sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Lead",
        id: id.to_string(),
    })
}

/// Get the most recent lead with this phone number.
pub async fn get_lead_by_phone(pool: &SqlitePool, phone: &str) -> Result<Option<Lead>> {
    let lead = sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE phone = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(phone)
    .fetch_optional(pool)
    .await?;

    Ok(lead)
}

/// List leads, newest first.
pub async fn list_leads(pool: &SqlitePool, filter: &LeadFilter) -> Result<Vec<Lead>> {
    let leads = sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE (?1 IS NULL OR status = ?1)
          AND (?2 IS NULL OR source = ?2)
          AND (?3 IS NULL OR priority = ?3)
          AND (?4 IS NULL OR qualification_score >= ?4)
          AND (?5 IS NULL OR agent_id = ?5)
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?6 OFFSET ?7
        "#,
    )
    .bind(filter.status)
    .bind(filter.source)
    .bind(filter.priority)
    .bind(filter.min_score)
    .bind(&filter.agent_id)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await?;

    Ok(leads)
}

/// Update every writable column of a lead.
pub async fn update_lead(pool: &SqlitePool, lead: &Lead) -> Result<Lead> {
    validate_required("phone", &lead.phone)?;

    let result = sqlx::query(
        r#"
        UPDATE leads
        SET agent_id = ?, first_name = ?, last_name = ?, phone = ?, email = ?,
            property_type = ?, transaction_type = ?, budget_min = ?, budget_max = ?,
            preferred_cities = ?, preferred_districts = ?, min_bedrooms = ?, min_area = ?,
            must_have_parking = ?, must_have_garden = ?, must_have_pool = ?,
            must_have_elevator = ?, status = ?, source = ?, priority = ?, notes = ?,
            qualification_score = ?, ai_summary = ?, ai_extracted_criteria = ?,
            interested_properties = ?, last_contact_at = ?, converted_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&lead.agent_id)
    .bind(&lead.first_name)
    .bind(&lead.last_name)
    .bind(&lead.phone)
    .bind(&lead.email)
    .bind(lead.property_type)
    .bind(lead.transaction_type)
    .bind(lead.budget_min)
    .bind(lead.budget_max)
    .bind(Json(&lead.preferred_cities))
    .bind(Json(&lead.preferred_districts))
    .bind(lead.min_bedrooms)
    .bind(lead.min_area)
    .bind(lead.must_have_parking)
    .bind(lead.must_have_garden)
    .bind(lead.must_have_pool)
    .bind(lead.must_have_elevator)
    .bind(lead.status)
    .bind(lead.source)
    .bind(lead.priority)
    .bind(&lead.notes)
    .bind(lead.qualification_score)
    .bind(&lead.ai_summary)
    .bind(&lead.ai_extracted_criteria)
    .bind(Json(&lead.interested_properties))
    .bind(&lead.last_contact_at)
    .bind(&lead.converted_at)
    .bind(&lead.id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Lead", &lead.id, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Lead",
            id: lead.id.clone(),
        });
    }

    get_lead(pool, &lead.id).await
}

/// Move a lead to any pipeline status.
pub async fn update_lead_status(pool: &SqlitePool, id: &str, status: LeadStatus) -> Result<Lead> {
    let result = sqlx::query(
        r#"
        UPDATE leads
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
            entity: "Lead",
            id: id.to_string(),
        });
    }

    get_lead(pool, id).await
}

/// Mark a lead as contacted now.
pub async fn mark_contacted(pool: &SqlitePool, id: &str) -> Result<Lead> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET status = ?, last_contact_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(LeadStatus::Contacted)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Lead",
            id: id.to_string(),
        });
    }

    get_lead(pool, id).await
}

/// Mark a lead as converted now.
pub async fn convert_lead(pool: &SqlitePool, id: &str) -> Result<Lead> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET status = ?, converted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(LeadStatus::Converted)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Lead",
            id: id.to_string(),
        });
    }

    tracing::info!(lead_id = %id, "Lead converted");
    get_lead(pool, id).await
}

/// Append a property to the lead's interests if not already present.
///
/// The property id is not checked against `properties`.
pub async fn add_interested_property(
    pool: &SqlitePool,
    lead_id: &str,
    property_id: &str,
) -> Result<Lead> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET interested_properties = json_insert(interested_properties, '$[#]', ?1)
        WHERE id = ?2
          AND NOT EXISTS (
              SELECT 1 FROM json_each(leads.interested_properties)
              WHERE json_each.value = ?1
          )
        "#,
    )
    .bind(property_id)
    .bind(lead_id)
    .execute(pool)
    .await?;

    let lead = get_lead(pool, lead_id).await?;
    if result.rows_affected() == 0 {
        tracing::debug!(lead_id, property_id, "Property already in lead interests");
    }
    Ok(lead)
}

/// Leads waiting for first handling with high or urgent priority.
pub async fn high_priority_leads(pool: &SqlitePool, limit: i64) -> Result<Vec<Lead>> {
    let leads = sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE status IN ('new', 'contacted')
          AND priority IN ('high', 'urgent')
        ORDER BY CASE priority WHEN 'urgent' THEN 0 ELSE 1 END, created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(leads)
}

/// `(lead_id, property_id)` pairs whose property no longer exists.
pub async fn dangling_interested_properties(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT leads.id, json_each.value
        FROM leads, json_each(leads.interested_properties)
        WHERE NOT EXISTS (SELECT 1 FROM properties WHERE properties.id = json_each.value)
        ORDER BY leads.id, json_each.key
        "#,
    )
    .fetch_all(pool)
    .await?;

    if !rows.is_empty() {
        tracing::warn!(count = rows.len(), "Leads reference missing properties");
    }

    Ok(rows)
}

/// Count leads grouped by status.
pub async fn count_leads_by_status(pool: &SqlitePool) -> Result<Vec<(LeadStatus, i64)>> {
    let rows = sqlx::query_as::<_, (LeadStatus, i64)>(
        r#"
        SELECT status, COUNT(*) as count
        FROM leads
        GROUP BY status
        ORDER BY count DESC, status
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Pipeline figures for the whole lead table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadStatistics {
    pub total: i64,
    /// Every status, including those with no leads.
    pub by_status: Vec<(LeadStatus, i64)>,
    /// Mean of the scored leads, rounded to two decimals.
    pub average_qualification_score: Option<f64>,
    /// Leads with high or urgent priority.
    pub high_priority: i64,
}

/// Compute [`LeadStatistics`].
pub async fn lead_statistics(pool: &SqlitePool) -> Result<LeadStatistics> {
    let (total, average_qualification_score, high_priority) =
        sqlx::query_as::<_, (i64, Option<f64>, i64)>(
            r#"
            SELECT COUNT(*),
                   ROUND(AVG(qualification_score), 2),
                   COALESCE(SUM(priority IN ('high', 'urgent')), 0)
            FROM leads
            "#,
        )
        .fetch_one(pool)
        .await?;

    let counted = count_leads_by_status(pool).await?;
    let by_status = LeadStatus::ALL
        .iter()
        .map(|status| {
            let count = counted
                .iter()
                .find(|(s, _)| s == status)
                .map_or(0, |(_, n)| *n);
            (*status, count)
        })
        .collect();

    Ok(LeadStatistics {
        total,
        by_status,
        average_qualification_score,
        high_priority,
    })
}

/// Delete a lead by ID.
///
/// Conversations linked to the lead keep existing with `lead_id` cleared.
pub async fn delete_lead(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM leads
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Lead",
            id: id.to_string(),
        });
    }

    tracing::info!(lead_id = %id, "Deleted lead");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_agent, test_db, test_lead};
    use crate::{ConstraintKind, FixedDecimal, PropertyType, TransactionType};
    use serde_json::json;

    #[tokio::test]
    async fn test_lead_crud() {
        let db = test_db().await;
        let agent = test_agent(&db, "leads@agence.ma").await;

        let new = NewLead {
            agent_id: Some(agent.id.clone()),
            email: Some("omar@example.com".to_string()),
            property_type: Some(PropertyType::Apartment),
            transaction_type: Some(TransactionType::Sale),
            budget_min: Some(FixedDecimal::from_units(900_000).unwrap()),
            budget_max: Some(FixedDecimal::from_units(1_400_000).unwrap()),
            preferred_cities: vec!["Rabat".to_string(), "Salé".to_string(), "Témara".to_string()],
            min_bedrooms: Some(2),
            must_have_elevator: true,
            qualification_score: Some(72),
            ai_extracted_criteria: Some(json!({"motivation": "habitation", "timeframe": "3 mois"})),
            ..test_lead("Omar", "0612345678")
        };
        let created = create_lead(db.pool(), &new).await.unwrap();
        assert_eq!(created.status, LeadStatus::New);
        assert_eq!(created.source, LeadSource::AgentIa);
        assert_eq!(created.priority, LeadPriority::Medium);
        assert_eq!(created.preferred_cities, new.preferred_cities);
        assert_eq!(created.ai_extracted_criteria, new.ai_extracted_criteria);

        let by_phone = get_lead_by_phone(db.pool(), "0612345678").await.unwrap().unwrap();
        assert_eq!(by_phone.id, created.id);
        assert!(get_lead_by_phone(db.pool(), "0700000000").await.unwrap().is_none());

        let updated = update_lead(
            db.pool(),
            &Lead {
                notes: Some("Rappeler samedi".to_string()),
                priority: LeadPriority::High,
                ..created.clone()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Rappeler samedi"));
        assert_eq!(updated.priority, LeadPriority::High);

        delete_lead(db.pool(), &created.id).await.unwrap();
        assert!(matches!(
            get_lead(db.pool(), &created.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_phone_is_mandatory() {
        let db = test_db().await;

        let result = create_lead(db.pool(), &test_lead("Omar", "  ")).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));

        let err = sqlx::query(
            "INSERT INTO leads (id, first_name, last_name) VALUES ('l1', 'Sans', 'Téléphone')",
        )
        .execute(db.pool())
        .await
        .map_err(|e| map_write_error("Lead", "l1", e))
        .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::NotNull));
    }

    #[tokio::test]
    async fn test_invalid_status_rejected_by_store() {
        let db = test_db().await;
        let lead = create_lead(db.pool(), &test_lead("Hind", "0611111111")).await.unwrap();

        for statement in [
            "UPDATE leads SET status = 'archived' WHERE id = ?",
            "UPDATE leads SET priority = 'critical' WHERE id = ?",
            "UPDATE leads SET source = 'billboard' WHERE id = ?",
            "UPDATE leads SET qualification_score = 101 WHERE id = ?",
        ] {
            let err = sqlx::query(statement)
                .bind(&lead.id)
                .execute(db.pool())
                .await
                .map_err(|e| map_write_error("Lead", &lead.id, e))
                .unwrap_err();
            assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check), "{statement}");
        }
    }

    #[tokio::test]
    async fn test_budget_range_checked() {
        let db = test_db().await;
        let new = NewLead {
            budget_min: Some(FixedDecimal::from_units(2_000_000).unwrap()),
            budget_max: Some(FixedDecimal::from_units(1_000_000).unwrap()),
            ..test_lead("Rachid", "0622222222")
        };

        let result = create_lead(db.pool(), &new).await;
        assert!(matches!(
            result,
            Err(DatabaseError::Constraint {
                kind: ConstraintKind::Check,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_pipeline_transitions_unconstrained() {
        let db = test_db().await;
        let lead = create_lead(db.pool(), &test_lead("Sara", "0633333333")).await.unwrap();

        let contacted = mark_contacted(db.pool(), &lead.id).await.unwrap();
        assert_eq!(contacted.status, LeadStatus::Contacted);
        assert!(contacted.last_contact_at.is_some());

        // Any status may follow any other.
        let lost = update_lead_status(db.pool(), &lead.id, LeadStatus::Lost).await.unwrap();
        assert_eq!(lost.status, LeadStatus::Lost);
        let back = update_lead_status(db.pool(), &lead.id, LeadStatus::New).await.unwrap();
        assert_eq!(back.status, LeadStatus::New);

        let converted = convert_lead(db.pool(), &lead.id).await.unwrap();
        assert_eq!(converted.status, LeadStatus::Converted);
        assert!(converted.converted_at.is_some());

        let missing = convert_lead(db.pool(), "missing").await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_leads_filters() {
        let db = test_db().await;
        let agent = test_agent(&db, "triage@agence.ma").await;

        let mut hot = test_lead("Ilyas", "0644444444");
        hot.agent_id = Some(agent.id.clone());
        hot.priority = LeadPriority::Urgent;
        hot.qualification_score = Some(90);
        let hot = create_lead(db.pool(), &hot).await.unwrap();

        let mut warm = test_lead("Meryem", "0655555555");
        warm.priority = LeadPriority::High;
        warm.source = LeadSource::Website;
        warm.qualification_score = Some(60);
        let warm = create_lead(db.pool(), &warm).await.unwrap();

        let cold = create_lead(db.pool(), &test_lead("Anas", "0666666666")).await.unwrap();
        update_lead_status(db.pool(), &cold.id, LeadStatus::Unqualified).await.unwrap();

        let scored = list_leads(
            db.pool(),
            &LeadFilter {
                min_score: Some(70),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].id, hot.id);

        let web = list_leads(
            db.pool(),
            &LeadFilter {
                source: Some(LeadSource::Website),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].id, warm.id);

        let mine = list_leads(
            db.pool(),
            &LeadFilter {
                agent_id: Some(agent.id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(mine.len(), 1);

        let priority = high_priority_leads(db.pool(), 10).await.unwrap();
        assert_eq!(priority.len(), 2);
        assert_eq!(priority[0].id, hot.id);
        assert_eq!(priority[1].id, warm.id);

        let counts = count_leads_by_status(db.pool()).await.unwrap();
        assert_eq!(
            counts,
            vec![(LeadStatus::New, 2), (LeadStatus::Unqualified, 1)]
        );
    }

    #[tokio::test]
    async fn test_lead_statistics() {
        let db = test_db().await;

        let empty = lead_statistics(db.pool()).await.unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.average_qualification_score, None);
        assert_eq!(empty.by_status.len(), LeadStatus::ALL.len());

        for (first, phone, score, priority) in [
            ("Aya", "0610101010", Some(80), LeadPriority::Urgent),
            ("Badr", "0620202020", Some(65), LeadPriority::High),
            ("Chama", "0630303030", None, LeadPriority::Low),
        ] {
            let new = NewLead {
                qualification_score: score,
                priority,
                ..test_lead(first, phone)
            };
            create_lead(db.pool(), &new).await.unwrap();
        }
        let lost = get_lead_by_phone(db.pool(), "0630303030").await.unwrap().unwrap();
        update_lead_status(db.pool(), &lost.id, LeadStatus::Lost).await.unwrap();

        let stats = lead_statistics(db.pool()).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.average_qualification_score, Some(72.5));
        assert_eq!(stats.high_priority, 2);
        assert!(stats.by_status.contains(&(LeadStatus::New, 2)));
        assert!(stats.by_status.contains(&(LeadStatus::Lost, 1)));
        assert!(stats.by_status.contains(&(LeadStatus::Converted, 0)));
    }

    #[tokio::test]
    async fn test_interested_properties_are_not_enforced() {
        use crate::{property, NewProperty};

        let db = test_db().await;
        let listing = property::create_property(
            db.pool(),
            &NewProperty::new(
                "Riad restauré",
                PropertyType::Riad,
                TransactionType::Sale,
                "Fès",
                FixedDecimal::from_units(2_300_000).unwrap(),
                FixedDecimal::from_units(280).unwrap(),
            ),
        )
        .await
        .unwrap();
        let lead = create_lead(db.pool(), &test_lead("Yasmine", "0677777777")).await.unwrap();

        add_interested_property(db.pool(), &lead.id, &listing.id).await.unwrap();
        add_interested_property(db.pool(), &lead.id, "ghost-property").await.unwrap();
        let lead = add_interested_property(db.pool(), &lead.id, &listing.id).await.unwrap();
        assert_eq!(lead.interested_properties, vec![listing.id.clone(), "ghost-property".to_string()]);

        let dangling = dangling_interested_properties(db.pool()).await.unwrap();
        assert_eq!(dangling, vec![(lead.id.clone(), "ghost-property".to_string())]);

        property::delete_property(db.pool(), &listing.id).await.unwrap();
        let lead = get_lead(db.pool(), &lead.id).await.unwrap();
        assert_eq!(lead.interested_properties.len(), 2);
        assert_eq!(dangling_interested_properties(db.pool()).await.unwrap().len(), 2);
    }
}
