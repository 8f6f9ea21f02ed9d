use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::shared::models::schema::audit_logs;
use crate::shared::models::{AuditLog, NewAuditLog};

/// Audit actions recorded by the portal. One constant per mutating
/// operation so the feed and tests never drift from the writers.
pub mod actions {
    pub const UPDATE_RESPONSE: &str = "update_response";
    pub const SUBMIT_QUESTIONNAIRE: &str = "submit_questionnaire";
    pub const INVITE_SENT: &str = "invite_sent";
    pub const INVITE_ACCEPTED: &str = "invite_accepted";
    pub const ASSET_UPLOAD_REQUESTED: &str = "asset_upload_requested";
    pub const SECRET_CREATED: &str = "secret_created";
    pub const ACCESS_REQUEST: &str = "access_request";
}

pub struct AuditEntry {
    pub company_id: Uuid,
    pub actor: Uuid,
    pub action: &'static str,
    pub target_type: &'static str,
    pub target_id: Option<String>,
    pub details: serde_json::Value,
}

/// Append one audit row. The log is append-only; rows are never updated
/// or deleted by the application.
pub fn record(conn: &mut PgConnection, entry: AuditEntry) -> QueryResult<()> {
    let row = NewAuditLog {
        company_id: entry.company_id,
        actor: entry.actor,
        action: entry.action.to_string(),
        target_type: entry.target_type.to_string(),
        target_id: entry.target_id,
        details: entry.details,
        created_at: Utc::now(),
    };

    diesel::insert_into(audit_logs::table)
        .values(&row)
        .execute(conn)?;

    Ok(())
}

/// Most-recent-first activity feed for one company. Rows written in the
/// same instant tie-break on the sequence id, so the newest insert still
/// leads the feed.
pub fn recent_for_company(
    conn: &mut PgConnection,
    company: Uuid,
    limit: i64,
) -> QueryResult<Vec<AuditLog>> {
    audit_logs::table
        .filter(audit_logs::company_id.eq(company))
        .order((audit_logs::created_at.desc(), audit_logs::id.desc()))
        .limit(limit)
        .load(conn)
}
