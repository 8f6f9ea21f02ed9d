use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod schema {
    diesel::table! {
        companies (id) {
            id -> Uuid,
            name -> Text,
            website -> Nullable<Text>,
            industry -> Nullable<Text>,
            business_type -> Nullable<Text>,
            country -> Nullable<Text>,
            timezone -> Nullable<Text>,
            notes -> Nullable<Text>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        company_members (company_id, user_id) {
            company_id -> Uuid,
            user_id -> Uuid,
            role -> Text,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        services (id) {
            id -> Uuid,
            key -> Text,
            label -> Text,
        }
    }

    diesel::table! {
        company_services (company_id, service_id) {
            company_id -> Uuid,
            service_id -> Uuid,
            status -> Text,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        questionnaires (id) {
            id -> Uuid,
            company_id -> Uuid,
            version -> Int4,
            selected_services -> Array<Text>,
            status -> Text,
            started_by -> Uuid,
            submitted_at -> Nullable<Timestamptz>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        questionnaire_responses (questionnaire_id, section_key) {
            questionnaire_id -> Uuid,
            section_key -> Text,
            responses -> Jsonb,
            updated_by -> Uuid,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        assets (id) {
            id -> Uuid,
            company_id -> Uuid,
            bucket -> Text,
            path -> Text,
            label -> Nullable<Text>,
            kind -> Nullable<Text>,
            created_by -> Uuid,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        secrets (id) {
            id -> Uuid,
            company_id -> Uuid,
            label -> Text,
            secret_type -> Text,
            encrypted_value -> Text,
            created_by -> Uuid,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        invites (id) {
            id -> Uuid,
            company_id -> Uuid,
            email -> Text,
            role -> Text,
            token -> Text,
            accepted -> Bool,
            created_by -> Uuid,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        audit_logs (id) {
            id -> Int8,
            company_id -> Uuid,
            actor -> Uuid,
            action -> Text,
            target_type -> Text,
            target_id -> Nullable<Text>,
            details -> Jsonb,
            created_at -> Timestamptz,
        }
    }

    diesel::joinable!(company_services -> services (service_id));
    diesel::joinable!(company_services -> companies (company_id));
    diesel::joinable!(company_members -> companies (company_id));
    diesel::joinable!(questionnaires -> companies (company_id));
    diesel::joinable!(assets -> companies (company_id));
    diesel::joinable!(secrets -> companies (company_id));
    diesel::joinable!(invites -> companies (company_id));
    diesel::joinable!(audit_logs -> companies (company_id));

    diesel::allow_tables_to_appear_in_same_query!(
        companies,
        company_members,
        services,
        company_services,
        questionnaires,
        questionnaire_responses,
        assets,
        secrets,
        invites,
        audit_logs,
    );
}

use self::schema::{
    assets, audit_logs, companies, company_members, company_services, invites, questionnaire_responses,
    questionnaires, secrets, services,
};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub business_type: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub business_type: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable)]
#[diesel(table_name = company_members)]
pub struct CompanyMember {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = company_members)]
pub struct NewCompanyMember {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = services)]
pub struct Service {
    pub id: Uuid,
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = company_services)]
pub struct NewCompanyService {
    pub company_id: Uuid,
    pub service_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = questionnaires)]
pub struct Questionnaire {
    pub id: Uuid,
    pub company_id: Uuid,
    pub version: i32,
    pub selected_services: Vec<String>,
    pub status: String,
    pub started_by: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = questionnaires)]
pub struct NewQuestionnaire {
    pub id: Uuid,
    pub company_id: Uuid,
    pub version: i32,
    pub selected_services: Vec<String>,
    pub status: String,
    pub started_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable)]
#[diesel(table_name = questionnaire_responses)]
pub struct QuestionnaireResponse {
    pub questionnaire_id: Uuid,
    pub section_key: String,
    pub responses: serde_json::Value,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = questionnaire_responses)]
pub struct NewQuestionnaireResponse {
    pub questionnaire_id: Uuid,
    pub section_key: String,
    pub responses: serde_json::Value,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = assets)]
pub struct Asset {
    pub id: Uuid,
    pub company_id: Uuid,
    pub bucket: String,
    pub path: String,
    pub label: Option<String>,
    pub kind: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = assets)]
pub struct NewAsset {
    pub id: Uuid,
    pub company_id: Uuid,
    pub bucket: String,
    pub path: String,
    pub label: Option<String>,
    pub kind: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = secrets)]
pub struct Secret {
    pub id: Uuid,
    pub company_id: Uuid,
    pub label: String,
    pub secret_type: String,
    pub encrypted_value: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = secrets)]
pub struct NewSecret {
    pub id: Uuid,
    pub company_id: Uuid,
    pub label: String,
    pub secret_type: String,
    pub encrypted_value: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = invites)]
pub struct Invite {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub role: String,
    pub token: String,
    pub accepted: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invites)]
pub struct NewInvite {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub role: String,
    pub token: String,
    pub accepted: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = audit_logs)]
pub struct AuditLog {
    pub id: i64,
    pub company_id: Uuid,
    pub actor: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog {
    pub company_id: Uuid,
    pub actor: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
