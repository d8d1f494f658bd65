//! Property listing CRUD operations.

use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{map_write_error, DatabaseError, Result};
use crate::fixed_decimal::FixedDecimal;
use crate::models::{NewProperty, Property, PropertyStatus, PropertyType, TransactionType};

/// Default page size for [`list_properties`].
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Search filters for [`list_properties`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<PropertyStatus>,
    pub min_price: Option<FixedDecimal>,
    pub max_price: Option<FixedDecimal>,
    pub agent_id: Option<String>,
    pub min_bedrooms: Option<i64>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for PropertyFilter {
    fn default() -> Self {
        Self {
            city: None,
            property_type: None,
            transaction_type: None,
            status: None,
            min_price: None,
            max_price: None,
            agent_id: None,
            min_bedrooms: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Create a new listing.
pub async fn create_property(pool: &SqlitePool, new: &NewProperty) -> Result<Property> {
    let id = crate::new_id();
    sqlx::query(
        r#"
        INSERT INTO properties (
            id, agent_id, title, description, property_type, transaction_type, status,
            city, district, address, latitude, longitude, price, area,
            bedrooms, bathrooms, floor,
            has_parking, has_elevator, has_garden, has_pool, has_security, is_furnished,
            images, main_image
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.agent_id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.property_type)
    .bind(new.transaction_type)
    .bind(new.status)
    .bind(&new.city)
    .bind(&new.district)
    .bind(&new.address)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(new.price)
    .bind(new.area)
    .bind(new.bedrooms)
    .bind(new.bathrooms)
    .bind(new.floor)
    .bind(new.has_parking)
    .bind(new.has_elevator)
    .bind(new.has_garden)
    .bind(new.has_pool)
    .bind(new.has_security)
    .bind(new.is_furnished)
    .bind(Json(&new.images))
    .bind(&new.main_image)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Property", &id, e))?;

    tracing::debug!(property_id = %id, city = %new.city, "Created property");
    get_property(pool, &id).await
}

/// Get a listing by ID.
pub async fn get_property(pool: &SqlitePool, id: &str) -> Result<Property> {
    sqlx::query_as::<_, Property>(
        r#"
        SELECT * FROM properties
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Property",
        id: id.to_string(),
    })
}

/// Search listings, newest first.
pub async fn list_properties(pool: &SqlitePool, filter: &PropertyFilter) -> Result<Vec<Property>> {
    let rows = sqlx::query_as::<_, Property>(
        r#"
        SELECT * FROM properties
        WHERE (?1 IS NULL OR city = ?1)
          AND (?2 IS NULL OR property_type = ?2)
          AND (?3 IS NULL OR transaction_type = ?3)
          AND (?4 IS NULL OR status = ?4)
          AND (?5 IS NULL OR price >= ?5)
          AND (?6 IS NULL OR price <= ?6)
          AND (?7 IS NULL OR agent_id = ?7)
          AND (?8 IS NULL OR bedrooms >= ?8)
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?9 OFFSET ?10
        "#,
    )
    .bind(&filter.city)
    .bind(filter.property_type)
    .bind(filter.transaction_type)
    .bind(filter.status)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(&filter.agent_id)
    .bind(filter.min_bedrooms)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Update every writable column of a listing.
pub async fn update_property(pool: &SqlitePool, property: &Property) -> Result<Property> {
    let result = sqlx::query(
        r#"
        UPDATE properties
        SET agent_id = ?, title = ?, description = ?, property_type = ?, transaction_type = ?,
            status = ?, city = ?, district = ?, address = ?, latitude = ?, longitude = ?,
            price = ?, area = ?, bedrooms = ?, bathrooms = ?, floor = ?,
            has_parking = ?, has_elevator = ?, has_garden = ?, has_pool = ?,
            has_security = ?, is_furnished = ?, images = ?, main_image = ?
        WHERE id = ?
        "#,
    )
    .bind(&property.agent_id)
    .bind(&property.title)
    .bind(&property.description)
    .bind(property.property_type)
    .bind(property.transaction_type)
    .bind(property.status)
    .bind(&property.city)
    .bind(&property.district)
    .bind(&property.address)
    .bind(property.latitude)
    .bind(property.longitude)
    .bind(property.price)
    .bind(property.area)
    .bind(property.bedrooms)
    .bind(property.bathrooms)
    .bind(property.floor)
    .bind(property.has_parking)
    .bind(property.has_elevator)
    .bind(property.has_garden)
    .bind(property.has_pool)
    .bind(property.has_security)
    .bind(property.is_furnished)
    .bind(Json(&property.images))
    .bind(&property.main_image)
    .bind(&property.id)
    .execute(pool)
    .await
    .map_err(|e| map_write_error("Property", &property.id, e))?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Property",
            id: property.id.clone(),
        });
    }

    get_property(pool, &property.id).await
}

/// Change a listing's status.
pub async fn set_property_status(
    pool: &SqlitePool,
    id: &str,
    status: PropertyStatus,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE properties
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
            entity: "Property",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Mark a listing as published. The first publication time is kept.
pub async fn publish_property(pool: &SqlitePool, id: &str) -> Result<Property> {
    let result = sqlx::query(
        r#"
        UPDATE properties
        SET published_at = COALESCE(published_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Property",
            id: id.to_string(),
        });
    }

    get_property(pool, id).await
}

/// Increment the view counter.
pub async fn increment_views(pool: &SqlitePool, id: &str) -> Result<()> {
    increment_counter(pool, id, "views_count").await
}

/// Increment the favorite counter.
pub async fn increment_favorites(pool: &SqlitePool, id: &str) -> Result<()> {
    increment_counter(pool, id, "favorites_count").await
}

async fn increment_counter(pool: &SqlitePool, id: &str, column: &'static str) -> Result<()> {
    // Column names cannot be bound; callers pass a fixed name.
    let query = format!(
        "UPDATE properties SET {column} = {column} + 1 WHERE id = ?",
        column = column
    );
    let result = sqlx::query(&query).bind(id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Property",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Delete a listing by ID.
pub async fn delete_property(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM properties
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Property",
            id: id.to_string(),
        });
    }

    tracing::info!(property_id = %id, "Deleted property");
    Ok(())
}
