//! Database models.
//!
//! Enumerated columns are closed sets enforced by `CHECK` constraints in the
//! store; the Rust enums below carry exactly the stored strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::fixed_decimal::FixedDecimal;

/// Error returned when a string is not a member of a stored enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// Enumeration name.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

macro_rules! stored_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $value:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $value)]
                #[sqlx(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            /// Every member, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The stored string for this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

stored_enum! {
    /// Role of a platform user.
    pub enum AgentRole {
        Admin => "admin",
        Agent => "agent",
        Manager => "manager",
    }
}

stored_enum! {
    /// Account status of a platform user.
    pub enum AgentStatus {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
    }
}

stored_enum! {
    /// Kind of real-estate asset.
    pub enum PropertyType {
        Apartment => "appartement",
        Villa => "villa",
        House => "maison",
        Land => "terrain",
        Riad => "riad",
        Office => "bureau",
        CommercialSpace => "local_commercial",
        Building => "immeuble",
    }
}

stored_enum! {
    /// Kind of transaction offered or sought.
    pub enum TransactionType {
        Sale => "vente",
        Rental => "location",
        VacationRental => "location_vacances",
    }
}

stored_enum! {
    /// Listing lifecycle status.
    pub enum PropertyStatus {
        Available => "disponible",
        Reserved => "reserve",
        Sold => "vendu",
        Rented => "loue",
        Withdrawn => "retire",
    }
}

stored_enum! {
    /// Position of a lead in the sales pipeline.
    pub enum LeadStatus {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        Interested => "interested",
        Negotiation => "negotiation",
        Converted => "converted",
        Lost => "lost",
        Unqualified => "unqualified",
    }
}

stored_enum! {
    /// Acquisition channel of a lead.
    pub enum LeadSource {
        AgentIa => "agent_ia",
        Chatbot => "chatbot",
        Website => "website",
        WebForm => "web_form",
        Phone => "phone",
        Email => "email",
        Referral => "referral",
        SocialMedia => "social_media",
        WalkIn => "walk_in",
        Other => "other",
    }
}

stored_enum! {
    /// Handling priority of a lead.
    pub enum LeadPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

stored_enum! {
    /// Lifecycle status of a qualification conversation.
    pub enum ConversationStatus {
        Active => "active",
        Completed => "completed",
        Abandoned => "abandoned",
    }
}

stored_enum! {
    /// Author of a conversation message.
    pub enum MessageRole {
        System => "system",
        User => "user",
        Assistant => "assistant",
        /// Output of a tool call.
        Function => "function",
    }
}

impl Default for AgentRole {
    fn default() -> Self {
        AgentRole::Agent
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Active
    }
}

impl Default for PropertyStatus {
    fn default() -> Self {
        PropertyStatus::Available
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        LeadStatus::New
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        LeadSource::AgentIa
    }
}

impl Default for LeadPriority {
    fn default() -> Self {
        LeadPriority::Medium
    }
}

impl Default for ConversationStatus {
    fn default() -> Self {
        ConversationStatus::Active
    }
}

/// A real-estate agent (row of `users`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Agent {
    /// UUID.
    pub id: String,
    /// Unique login email.
    pub email: String,
    /// Credential hash, computed by the authentication layer.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    /// Ordered list of specialties.
    #[sqlx(json)]
    pub specialties: Vec<String>,
    /// Ordered list of covered cities.
    #[sqlx(json)]
    pub cities_covered: Vec<String>,
    /// Properties owned. Maintained by [`crate::agent::recompute_counters`].
    pub properties_count: i64,
    /// Leads assigned.
    pub leads_count: i64,
    /// Assigned leads that converted.
    pub conversions_count: i64,
    pub created_at: String,
    /// Maintained by the store on every update.
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

/// Fields supplied when registering an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgent {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: AgentRole,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub specialties: Vec<String>,
    pub cities_covered: Vec<String>,
}

/// A property listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Property {
    /// UUID.
    pub id: String,
    /// Owning agent; cleared when the agent is deleted.
    pub agent_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub property_type: PropertyType,
    pub transaction_type: TransactionType,
    pub status: PropertyStatus,
    pub city: String,
    pub district: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: FixedDecimal,
    /// Surface area in square metres.
    pub area: FixedDecimal,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub floor: Option<i64>,
    pub has_parking: bool,
    pub has_elevator: bool,
    pub has_garden: bool,
    pub has_pool: bool,
    pub has_security: bool,
    pub is_furnished: bool,
    /// Ordered image URLs.
    #[sqlx(json)]
    pub images: Vec<String>,
    pub main_image: Option<String>,
    pub views_count: i64,
    pub favorites_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub published_at: Option<String>,
}

/// Fields supplied when creating a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProperty {
    pub agent_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub property_type: PropertyType,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub status: PropertyStatus,
    pub city: String,
    pub district: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: FixedDecimal,
    pub area: FixedDecimal,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub floor: Option<i64>,
    #[serde(default)]
    pub has_parking: bool,
    #[serde(default)]
    pub has_elevator: bool,
    #[serde(default)]
    pub has_garden: bool,
    #[serde(default)]
    pub has_pool: bool,
    #[serde(default)]
    pub has_security: bool,
    #[serde(default)]
    pub is_furnished: bool,
    #[serde(default)]
    pub images: Vec<String>,
    pub main_image: Option<String>,
}

impl NewProperty {
    /// A listing with only the required fields set.
    pub fn new(
        title: impl Into<String>,
        property_type: PropertyType,
        transaction_type: TransactionType,
        city: impl Into<String>,
        price: FixedDecimal,
        area: FixedDecimal,
    ) -> Self {
        Self {
            agent_id: None,
            title: title.into(),
            description: None,
            property_type,
            transaction_type,
            status: PropertyStatus::default(),
            city: city.into(),
            district: None,
            address: None,
            latitude: None,
            longitude: None,
            price,
            area,
            bedrooms: None,
            bathrooms: None,
            floor: None,
            has_parking: false,
            has_elevator: false,
            has_garden: false,
            has_pool: false,
            has_security: false,
            is_furnished: false,
            images: Vec::new(),
            main_image: None,
        }
    }
}

/// A prospective client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Lead {
    /// UUID.
    pub id: String,
    /// Assigned agent; cleared when the agent is deleted.
    pub agent_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub property_type: Option<PropertyType>,
    pub transaction_type: Option<TransactionType>,
    pub budget_min: Option<FixedDecimal>,
    pub budget_max: Option<FixedDecimal>,
    #[sqlx(json)]
    pub preferred_cities: Vec<String>,
    #[sqlx(json)]
    pub preferred_districts: Vec<String>,
    pub min_bedrooms: Option<i64>,
    pub min_area: Option<FixedDecimal>,
    pub must_have_parking: bool,
    pub must_have_garden: bool,
    pub must_have_pool: bool,
    pub must_have_elevator: bool,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub priority: LeadPriority,
    pub notes: Option<String>,
    /// 0-100, produced by the external qualification service.
    pub qualification_score: Option<i64>,
    pub ai_summary: Option<String>,
    /// Opaque criteria document from the qualification service.
    pub ai_extracted_criteria: Option<Value>,
    /// Property ids, not enforced by the store.
    #[sqlx(json)]
    pub interested_properties: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_contact_at: Option<String>,
    pub converted_at: Option<String>,
}

/// Fields supplied when capturing a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub agent_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub property_type: Option<PropertyType>,
    pub transaction_type: Option<TransactionType>,
    pub budget_min: Option<FixedDecimal>,
    pub budget_max: Option<FixedDecimal>,
    #[serde(default)]
    pub preferred_cities: Vec<String>,
    #[serde(default)]
    pub preferred_districts: Vec<String>,
    pub min_bedrooms: Option<i64>,
    pub min_area: Option<FixedDecimal>,
    #[serde(default)]
    pub must_have_parking: bool,
    #[serde(default)]
    pub must_have_garden: bool,
    #[serde(default)]
    pub must_have_pool: bool,
    #[serde(default)]
    pub must_have_elevator: bool,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub priority: LeadPriority,
    pub notes: Option<String>,
    pub qualification_score: Option<i64>,
    pub ai_summary: Option<String>,
    pub ai_extracted_criteria: Option<Value>,
    #[serde(default)]
    pub interested_properties: Vec<String>,
}

/// An AI qualification dialogue with a prospect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    /// UUID.
    pub id: String,
    /// Client session identifier, unique.
    pub session_id: String,
    pub status: ConversationStatus,
    pub prospect_name: Option<String>,
    pub prospect_phone: Option<String>,
    pub prospect_email: Option<String>,
    pub extracted_criteria: Value,
    /// 0-100.
    pub qualification_score: Option<i64>,
    pub ai_summary: Option<String>,
    /// End-of-conversation metadata.
    pub metadata: Value,
    /// Lead produced by this conversation; cleared when the lead is deleted.
    pub lead_id: Option<String>,
    pub agent_id: Option<String>,
    pub message_count: i64,
    pub duration_seconds: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Fields supplied when opening a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub session_id: String,
    pub prospect_name: Option<String>,
    pub prospect_phone: Option<String>,
    pub prospect_email: Option<String>,
    pub agent_id: Option<String>,
}

/// A single message within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Auto-incrementing ID.
    pub id: i64,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Value,
    pub created_at: String,
}
