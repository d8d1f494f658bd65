//! Admin command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use tracing::info;

use database::agent::{self, AgentFilter};
use database::document::{self, ConversationDocument};
use database::{conversation, lead, Action, Database, PolicySet, Role, Table};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Recompute agent property, lead and conversion counters
    Recount {
        /// Only this agent (defaults to every agent)
        #[arg(long)]
        agent: Option<String>,
    },

    /// Report lead pipeline figures and dangling property references
    Audit,

    /// Write a conversation as a single JSON document
    ExportConversation {
        /// Chat session ID of the conversation
        #[arg(long)]
        session: String,

        /// Output file (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Store a JSON conversation document as a new conversation
    ImportConversation {
        /// Document file to read
        #[arg(long)]
        file: PathBuf,
    },
}

impl Command {
    /// Table accesses the command performs.
    pub fn required_grants(&self) -> Vec<(Table, Action)> {
        match self {
            Command::Migrate => Table::ALL
                .into_iter()
                .flat_map(|table| Action::ALL.into_iter().map(move |action| (table, action)))
                .collect(),
            Command::Recount { .. } => vec![
                (Table::Users, Action::Select),
                (Table::Users, Action::Update),
                (Table::Properties, Action::Select),
                (Table::Leads, Action::Select),
            ],
            Command::Audit => vec![
                (Table::Users, Action::Select),
                (Table::Leads, Action::Select),
                (Table::Properties, Action::Select),
                (Table::Conversations, Action::Select),
            ],
            Command::ExportConversation { .. } => vec![
                (Table::Conversations, Action::Select),
                (Table::Messages, Action::Select),
            ],
            Command::ImportConversation { .. } => vec![
                (Table::Conversations, Action::Insert),
                (Table::Messages, Action::Insert),
            ],
        }
    }

    /// Check every required grant for `role`.
    pub fn authorize(&self, policies: &PolicySet, role: Role) -> Result<()> {
        for (table, action) in self.required_grants() {
            policies.check(role, table, action)?;
        }
        Ok(())
    }
}

/// Authorize `command` for `role`, then run it.
///
/// The schema is only changed by an explicit, authorized `migrate`.
pub async fn execute(
    command: &Command,
    policies: &PolicySet,
    role: Role,
    db: &Database,
) -> Result<Option<String>> {
    command.authorize(policies, role)?;
    info!(%role, command = ?command, "Running admin command");
    run(command, db).await
}

/// Run an already authorized command against the database.
///
/// Returns the text to print on stdout, if any.
pub async fn run(command: &Command, db: &Database) -> Result<Option<String>> {
    match command {
        Command::Migrate => {
            db.migrate().await?;
            Ok(None)
        }
        Command::Recount { agent } => recount(db, agent.as_deref()).await.map(Some),
        Command::Audit => audit(db).await.map(Some),
        Command::ExportConversation { session, out } => {
            export_conversation(db, session, out.as_deref()).await
        }
        Command::ImportConversation { file } => import_conversation(db, file).await.map(Some),
    }
}

async fn recount(db: &Database, agent_id: Option<&str>) -> Result<String> {
    let ids = match agent_id {
        Some(id) => vec![id.to_string()],
        None => agent::list_agents(db.pool(), &AgentFilter::default())
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect(),
    };

    let mut report = String::new();
    for id in &ids {
        let agent = agent::recompute_counters(db.pool(), id).await?;
        report.push_str(&format!(
            "{} {}: {} properties, {} leads, {} conversions\n",
            agent.first_name,
            agent.last_name,
            agent.properties_count,
            agent.leads_count,
            agent.conversions_count
        ));
    }

    info!(agents = ids.len(), "Recomputed agent counters");
    Ok(report)
}

async fn audit(db: &Database) -> Result<String> {
    let mut report = String::from("Agents by role:\n");
    for (role, count) in agent::count_agents_by_role(db.pool()).await? {
        report.push_str(&format!("  {role}: {count}\n"));
    }

    let leads = lead::lead_statistics(db.pool()).await?;
    report.push_str(&format!(
        "Leads: {} total, {} high priority, average score {}\n",
        leads.total,
        leads.high_priority,
        leads
            .average_qualification_score
            .map_or_else(|| "n/a".to_string(), |avg| format!("{avg:.2}"))
    ));
    report.push_str("Leads by status:\n");
    for (status, count) in &leads.by_status {
        report.push_str(&format!("  {status}: {count}\n"));
    }

    let conversations = conversation::conversation_statistics(db.pool()).await?;
    report.push_str(&format!(
        "Conversations: {} total, {} active, {} completed, {} abandoned\n",
        conversations.total, conversations.active, conversations.completed, conversations.abandoned
    ));
    report.push_str(&format!(
        "Conversations with a lead: {} (conversion rate {:.1}%)\n",
        conversations.with_lead, conversations.conversion_rate
    ));

    let dangling = lead::dangling_interested_properties(db.pool()).await?;
    if dangling.is_empty() {
        report.push_str("No dangling property references\n");
    } else {
        report.push_str("Dangling property references:\n");
        for (lead_id, property_id) in &dangling {
            report.push_str(&format!("  lead {lead_id} -> property {property_id}\n"));
        }
    }

    Ok(report)
}

async fn export_conversation(
    db: &Database,
    session_id: &str,
    out: Option<&Path>,
) -> Result<Option<String>> {
    let conversation = conversation::get_conversation_by_session(db.pool(), session_id).await?;
    let document = document::export_document(db.pool(), &conversation.id).await?;
    let json = serde_json::to_string_pretty(&document)?;

    match out {
        Some(path) => {
            fs::write(path, json)?;
            info!(session_id, path = %path.display(), "Exported conversation");
            Ok(None)
        }
        None => Ok(Some(json)),
    }
}

async fn import_conversation(db: &Database, file: &Path) -> Result<String> {
    let text = fs::read_to_string(file)?;
    let document: ConversationDocument = serde_json::from_str(&text)?;
    let conversation = document::import_document(db.pool(), &document).await?;

    Ok(format!(
        "Imported session {} as conversation {} ({} messages)",
        conversation.session_id, conversation.id, conversation.message_count
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::{DatabaseError, MessageRole, NewConversation};

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[test]
    fn test_placeholder_grants() {
        let policies = PolicySet::placeholder();
        let export = Command::ExportConversation {
            session: "s".to_string(),
            out: None,
        };

        assert!(export.authorize(&policies, Role::Public).is_ok());
        assert!(Command::Audit.authorize(&policies, Role::ServiceRole).is_ok());
        assert!(matches!(
            Command::Audit.authorize(&policies, Role::Authenticated),
            Err(crate::error::AdminError::Database(DatabaseError::AccessDenied {
                table: Table::Users,
                ..
            }))
        ));
        assert!(Command::Migrate.authorize(&policies, Role::Authenticated).is_err());
        assert!(export.authorize(&PolicySet::service_only(), Role::Public).is_err());
    }

    async fn applied_migrations(db: &Database) -> i64 {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_only_authorized_migrate_changes_schema() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let policies = PolicySet::placeholder();
        let export = Command::ExportConversation {
            session: "s".to_string(),
            out: None,
        };

        // Allowed for public, but must not touch the schema.
        assert!(execute(&export, &policies, Role::Public, &db).await.is_err());
        assert_eq!(applied_migrations(&db).await, 0);

        for role in [Role::Public, Role::Authenticated] {
            let denied = execute(&Command::Migrate, &policies, role, &db).await;
            assert!(matches!(
                denied,
                Err(crate::error::AdminError::Database(DatabaseError::AccessDenied { .. }))
            ));
            assert_eq!(applied_migrations(&db).await, 0);
        }

        execute(&Command::Migrate, &policies, Role::ServiceRole, &db)
            .await
            .unwrap();
        assert_eq!(applied_migrations(&db).await, 1);
    }

    #[tokio::test]
    async fn test_audit_reports_dangling_references() {
        let db = test_db().await;
        let lead = lead::create_lead(
            db.pool(),
            &database::NewLead {
                first_name: "Reda".to_string(),
                last_name: "Kettani".to_string(),
                phone: "0612121212".to_string(),
                interested_properties: vec!["gone".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let report = run(&Command::Audit, &db).await.unwrap().unwrap();
        assert!(report.contains("new: 1"));
        assert!(report.contains("converted: 0"));
        assert!(report.contains("Leads: 1 total, 0 high priority, average score n/a"));
        assert!(report.contains("Conversations: 0 total"));
        assert!(report.contains("conversion rate 0.0%"));
        assert!(report.contains(&format!("lead {} -> property gone", lead.id)));
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let db = test_db().await;
        let conversation = conversation::create_conversation(
            db.pool(),
            &NewConversation {
                session_id: "cli-1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        conversation::add_message(
            db.pool(),
            &conversation.id,
            MessageRole::User,
            "Bonjour",
            &serde_json::json!({}),
        )
        .await
        .unwrap();

        let export = Command::ExportConversation {
            session: "cli-1".to_string(),
            out: None,
        };
        let json = run(&export, &db).await.unwrap().unwrap();

        let mut document: ConversationDocument = serde_json::from_str(&json).unwrap();
        document.session_id = "cli-2".to_string();
        let path = std::env::temp_dir().join(format!("sabbar-admin-{}.json", std::process::id()));
        fs::write(&path, serde_json::to_string(&document).unwrap()).unwrap();

        let output = run(&Command::ImportConversation { file: path.clone() }, &db)
            .await
            .unwrap()
            .unwrap();
        fs::remove_file(&path).unwrap();
        assert!(output.contains("cli-2"));
        assert!(output.contains("1 messages"));

        let copy = conversation::get_conversation_by_session(db.pool(), "cli-2")
            .await
            .unwrap();
        assert_eq!(copy.message_count, 1);
    }
}
