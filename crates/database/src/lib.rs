//! SQLite persistence layer for the SABBAR real-estate lead platform.
//!
//! This crate owns the relational model (agents, property listings, leads
//! and AI qualification conversations with their messages) and provides
//! async data-access operations over it using SQLx with SQLite.
//!
//! The store itself enforces the model's invariants: closed enumerations
//! and format checks are `CHECK` constraints, `updated_at` is rewritten by
//! triggers, and deletes detach or cascade through foreign keys.
//!
//! # Example
//!
//! ```no_run
//! use database::{agent, property, Database, FixedDecimal, NewAgent, NewProperty};
//! use database::{PropertyType, TransactionType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:sabbar.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Register an agent
//!     let agent = agent::create_agent(
//!         db.pool(),
//!         &NewAgent {
//!             email: "amina@agence.ma".to_string(),
//!             password_hash: "$argon2id$...".to_string(),
//!             first_name: "Amina".to_string(),
//!             last_name: "Benali".to_string(),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//!
//!     // List a villa for sale
//!     let mut listing = NewProperty::new(
//!         "Villa avec piscine",
//!         PropertyType::Villa,
//!         TransactionType::Sale,
//!         "Marrakech",
//!         "4500000".parse::<FixedDecimal>()?,
//!         "420.5".parse::<FixedDecimal>()?,
//!     );
//!     listing.agent_id = Some(agent.id.clone());
//!     property::create_property(db.pool(), &listing).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod conversation;
pub mod document;
pub mod error;
pub mod fixed_decimal;
pub mod lead;
pub mod models;
pub mod policy;
pub mod property;
pub mod validation;

pub use conversation::ConversationStatistics;
pub use error::{ConstraintKind, DatabaseError, Result};
pub use fixed_decimal::{FixedDecimal, ParseFixedDecimalError};
pub use lead::LeadStatistics;
pub use models::{
    Agent, AgentRole, AgentStatus, Conversation, ConversationStatus, Lead, LeadPriority,
    LeadSource, LeadStatus, Message, MessageRole, NewAgent, NewConversation, NewLead,
    NewProperty, Property, PropertyStatus, PropertyType, TransactionType, UnknownVariant,
};
pub use policy::{Action, PolicySet, Role, Table};
pub use validation::ValidationError;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Handle on the SABBAR store: a pool of SQLite connections that all
/// enforce foreign keys.
///
/// Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connections kept by [`Database::connect`].
    pub const DEFAULT_POOL_SIZE: u32 = 20;

    /// How long a caller waits for a free connection.
    pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Open the store at `url` with [`Database::DEFAULT_POOL_SIZE`] connections.
    ///
    /// File URLs look like `sqlite:sabbar.db?mode=rwc`; the file is created
    /// when missing. `sqlite::memory:` gives a private in-memory store shared
    /// by the pool's connections, which is what the tests use.
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// let db = database::Database::connect("sqlite:data/sabbar.db?mode=rwc").await?;
    /// db.migrate().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Open the store with `pool_size` connections.
    ///
    /// `PRAGMA foreign_keys` is on for every connection, so agent, lead and
    /// conversation deletes detach or cascade as the schema declares.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "Connected to SABBAR store");
        Ok(Self { pool })
    }

    /// Create or upgrade the users, properties, leads, conversations and
    /// messages tables, with their checks, indexes and triggers.
    ///
    /// Applied migrations are recorded, so running this again is a no-op.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Applying schema migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Schema up to date");
        Ok(())
    }

    /// The underlying pool, passed to the data-access functions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Generate a new row identifier.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}


#[cfg(test)]
mod tests {
    use super::test_support::test_db;
    use super::*;

    #[tokio::test]
    async fn test_migrations_create_all_tables() {
        let db = test_db().await;

        let tables = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'
            ORDER BY name
            "#,
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec!["conversations", "leads", "messages", "properties", "users"]
        );
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = test_db().await;
        let enabled = sqlx::query_scalar::<_, i64>("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_custom_pool_size() {
        let db = Database::connect_with_pool_size("sqlite::memory:", 3)
            .await
            .unwrap();
        assert_eq!(db.pool().options().get_max_connections(), 3);
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = test_db().await;
        db.migrate().await.unwrap();
    }
}
