use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{self, actions, AuditEntry};
use crate::auth::AuthenticatedUser;
use crate::error::PortalError;
use crate::intake::forms;
use crate::membership::require_member;
use crate::shared::models::schema::{
    assets, companies, company_members, company_services, questionnaire_responses, questionnaires,
    secrets, services,
};
use crate::shared::models::{Asset, Company, Questionnaire, QuestionnaireResponse, Secret};
use crate::shared::state::AppState;
use crate::shared::utils::run_db;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/companies", get(list_companies))
        .route("/api/companies/:company_id", get(company_detail))
        .route("/api/companies/:company_id/activity", get(company_activity))
        .route("/api/companies/:company_id/export", get(export_company))
        .route(
            "/api/companies/:company_id/access-requests",
            post(create_access_request),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyTableRow {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub business_type: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub services: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub key: String,
    pub label: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: Uuid,
    pub label: Option<String>,
    pub path: String,
    pub kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSummary {
    pub id: Uuid,
    pub label: String,
    pub secret_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireDetail {
    pub id: Uuid,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub selected_services: Vec<String>,
    pub responses: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetail {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub business_type: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub notes: Option<String>,
    pub services: Vec<ServiceStatus>,
    pub assets: Vec<AssetSummary>,
    pub secrets: Vec<SecretSummary>,
    pub questionnaire: Option<QuestionnaireDetail>,
}

/// Latest questionnaire for summary rows: most recent submission wins,
/// unsubmitted drafts sort last.
pub fn latest_by_submission(rows: &[Questionnaire]) -> Option<&Questionnaire> {
    rows.iter().max_by_key(|q| q.submitted_at)
}

async fn list_companies(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<CompanyTableRow>>, PortalError> {
    let user_id = user.user_id;

    let rows = run_db(&state.conn, move |conn| {
        let member_companies: Vec<Company> = companies::table
            .inner_join(company_members::table)
            .filter(company_members::user_id.eq(user_id))
            .select(Company::as_select())
            .order(companies::updated_at.desc())
            .load(conn)
            .map_err(|e| PortalError::upstream("Unable to load companies.", e))?;

        let ids: Vec<Uuid> = member_companies.iter().map(|c| c.id).collect();
        let questionnaire_rows: Vec<Questionnaire> = questionnaires::table
            .filter(questionnaires::company_id.eq_any(&ids))
            .load(conn)
            .map_err(|e| PortalError::upstream("Unable to load companies.", e))?;

        let mut by_company: HashMap<Uuid, Vec<Questionnaire>> = HashMap::new();
        for q in questionnaire_rows {
            by_company.entry(q.company_id).or_default().push(q);
        }

        let table = member_companies
            .into_iter()
            .map(|company| {
                let latest = by_company
                    .get(&company.id)
                    .and_then(|rows| latest_by_submission(rows));

                CompanyTableRow {
                    id: company.id,
                    name: company.name,
                    website: company.website,
                    business_type: company.business_type,
                    updated_at: company.updated_at,
                    status: latest
                        .map(|q| q.status.clone())
                        .unwrap_or_else(|| "in_progress".to_string()),
                    submitted_at: latest.and_then(|q| q.submitted_at),
                    services: latest
                        .map(|q| {
                            q.selected_services
                                .iter()
                                .map(|key| forms::display_for_service_key(key))
                                .collect()
                        })
                        .unwrap_or_default(),
                }
            })
            .collect();

        Ok(table)
    })
    .await?;

    Ok(Json(rows))
}

async fn company_detail(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> Result<Json<CompanyDetail>, PortalError> {
    let user_id = user.user_id;

    let detail = run_db(&state.conn, move |conn| {
        require_member(
            conn,
            company_id,
            user_id,
            "You do not have access to this company.",
        )?;

        let company: Company = companies::table
            .filter(companies::id.eq(company_id))
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Unable to load the company profile.", e))?
            .ok_or_else(|| PortalError::NotFound("Company not found.".to_string()))?;

        let questionnaire: Option<Questionnaire> = questionnaires::table
            .filter(questionnaires::company_id.eq(company_id))
            .order(questionnaires::created_at.desc())
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Unable to load the questionnaire.", e))?;

        let questionnaire = match questionnaire {
            Some(q) => {
                let response_rows: Vec<QuestionnaireResponse> = questionnaire_responses::table
                    .filter(questionnaire_responses::questionnaire_id.eq(q.id))
                    .load(conn)
                    .map_err(|e| {
                        PortalError::upstream("Unable to load questionnaire responses.", e)
                    })?;

                let mut responses = serde_json::Map::new();
                for row in response_rows {
                    responses.insert(
                        row.section_key,
                        json!({
                            "updatedAt": row.updated_at,
                            "values": row.responses,
                        }),
                    );
                }

                Some(QuestionnaireDetail {
                    id: q.id,
                    status: q.status,
                    submitted_at: q.submitted_at,
                    selected_services: q
                        .selected_services
                        .iter()
                        .map(|key| forms::display_for_service_key(key))
                        .collect(),
                    responses,
                })
            }
            None => None,
        };

        let service_rows: Vec<(String, String, String)> = company_services::table
            .inner_join(services::table)
            .filter(company_services::company_id.eq(company_id))
            .select((services::key, services::label, company_services::status))
            .load(conn)
            .map_err(|e| PortalError::upstream("Unable to load company services.", e))?;

        let asset_rows: Vec<Asset> = assets::table
            .filter(assets::company_id.eq(company_id))
            .order(assets::created_at.desc())
            .load(conn)
            .map_err(|e| PortalError::upstream("Unable to load company assets.", e))?;

        let secret_rows: Vec<Secret> = secrets::table
            .filter(secrets::company_id.eq(company_id))
            .order(secrets::created_at.desc())
            .load(conn)
            .map_err(|e| PortalError::upstream("Unable to load stored credentials.", e))?;

        Ok(CompanyDetail {
            id: company.id,
            name: company.name,
            website: company.website,
            industry: company.industry,
            business_type: company.business_type,
            country: company.country,
            timezone: company.timezone,
            notes: company.notes,
            services: service_rows
                .into_iter()
                .map(|(key, label, status)| ServiceStatus { key, label, status })
                .collect(),
            assets: asset_rows
                .into_iter()
                .map(|a| AssetSummary {
                    id: a.id,
                    label: a.label,
                    path: a.path,
                    kind: a.kind,
                    created_at: a.created_at,
                })
                .collect(),
            secrets: secret_rows
                .into_iter()
                .map(|s| SecretSummary {
                    id: s.id,
                    label: s.label,
                    secret_type: s.secret_type,
                    created_at: s.created_at,
                })
                .collect(),
            questionnaire,
        })
    })
    .await?;

    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i64,
    pub action: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

async fn company_activity(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityEntry>>, PortalError> {
    let user_id = user.user_id;
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let feed = run_db(&state.conn, move |conn| {
        require_member(
            conn,
            company_id,
            user_id,
            "You do not have access to this company.",
        )?;

        let rows = audit::recent_for_company(conn, company_id, limit)
            .map_err(|e| PortalError::upstream("Unable to load company activity.", e))?;

        Ok(rows
            .into_iter()
            .map(|row| ActivityEntry {
                id: row.id,
                action: row.action,
                details: row.details,
                created_at: row.created_at,
            })
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(feed))
}

/// One CSV cell per (section, field) pair, stringified the way the
/// export consumers expect: scalars verbatim, lists comma-joined.
pub fn csv_cell_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(csv_cell_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Flatten section responses into `section,field,value` CSV. Every data
/// cell is double-quoted; quotes inside values are doubled.
pub fn responses_to_csv(
    sections: &[(String, serde_json::Map<String, Value>)],
) -> Result<String, PortalError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    for (section, fields) in sections {
        for (field, value) in fields {
            writer
                .write_record([section.as_str(), field.as_str(), &csv_cell_value(value)])
                .map_err(|e| PortalError::upstream("Unable to export the questionnaire.", e))?;
        }
    }

    let body = writer
        .into_inner()
        .map_err(|e| PortalError::upstream("Unable to export the questionnaire.", e))
        .and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|e| PortalError::upstream("Unable to export the questionnaire.", e))
        })?;

    Ok(format!("section,field,value\n{body}"))
}

async fn export_company(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> Result<Response, PortalError> {
    let user_id = user.user_id;

    let csv_body = run_db(&state.conn, move |conn| {
        require_member(
            conn,
            company_id,
            user_id,
            "You do not have access to this company.",
        )?;

        let latest: Option<Questionnaire> = questionnaires::table
            .filter(questionnaires::company_id.eq(company_id))
            .order(questionnaires::updated_at.desc())
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Unable to fetch questionnaire responses.", e))?;

        let sections = match latest {
            Some(q) => {
                let rows: Vec<QuestionnaireResponse> = questionnaire_responses::table
                    .filter(questionnaire_responses::questionnaire_id.eq(q.id))
                    .load(conn)
                    .map_err(|e| {
                        PortalError::upstream("Unable to fetch questionnaire responses.", e)
                    })?;

                rows.into_iter()
                    .map(|row| {
                        let fields = match row.responses {
                            Value::Object(map) => map,
                            _ => serde_json::Map::new(),
                        };
                        (row.section_key, fields)
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        responses_to_csv(&sections)
    })
    .await?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"company-{company_id}.csv\""),
        ),
    ];

    Ok((headers, csv_body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct AccessRequestBody {
    pub access_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessRequestResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Log a request for access to a client-held integration. The audit log
/// is the record; there is no dedicated table.
async fn create_access_request(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
    Json(body): Json<AccessRequestBody>,
) -> Result<Json<AccessRequestResponse>, PortalError> {
    let access_type = body
        .access_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PortalError::ValidationFailed("Select an access type.".to_string()))?
        .to_string();
    let notes = body.notes;
    let user_id = user.user_id;

    run_db(&state.conn, move |conn| {
        require_member(
            conn,
            company_id,
            user_id,
            "You do not have access to this company.",
        )?;

        audit::record(
            conn,
            AuditEntry {
                company_id,
                actor: user_id,
                action: actions::ACCESS_REQUEST,
                target_type: "integration",
                target_id: None,
                details: json!({
                    "access_type": access_type,
                    "notes": notes,
                }),
            },
        )
        .map_err(|e| PortalError::upstream("Could not log the access request.", e))
    })
    .await?;

    Ok(Json(AccessRequestResponse {
        status: "success",
        message: "Access request logged for your team.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn questionnaire(submitted_at: Option<DateTime<Utc>>, status: &str) -> Questionnaire {
        Questionnaire {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            version: 1,
            selected_services: vec!["seo".to_string()],
            status: status.to_string(),
            started_by: Uuid::new_v4(),
            submitted_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn latest_questionnaire_prefers_most_recent_submission() {
        let older = questionnaire(
            Some(Utc::now() - chrono::Duration::days(7)),
            "submitted",
        );
        let newer = questionnaire(Some(Utc::now()), "submitted");
        let draft = questionnaire(None, "in_progress");

        let rows = vec![older, draft, newer.clone()];
        let latest = latest_by_submission(&rows).unwrap();
        assert_eq!(latest.id, newer.id);
    }

    #[test]
    fn csv_cells_are_always_quoted() {
        let mut fields = serde_json::Map::new();
        fields.insert("seo_goals".to_string(), json!("grow"));
        let csv = responses_to_csv(&[("seo".to_string(), fields)]).unwrap();

        assert!(csv.starts_with("section,field,value\n"));
        assert!(csv.contains("\"seo\",\"seo_goals\",\"grow\""));
    }

    #[test]
    fn csv_doubles_inner_quotes() {
        let mut fields = serde_json::Map::new();
        fields.insert("tagline".to_string(), json!("the \"best\" agency"));
        let csv = responses_to_csv(&[("business".to_string(), fields)]).unwrap();

        assert!(csv.contains("\"the \"\"best\"\" agency\""));
    }

    #[test]
    fn csv_round_trips_through_a_reader() {
        let originals = vec![
            ("business", "company_name", "Acme \"Labs\", Inc."),
            ("business", "country", "NZ"),
            ("seo", "seo_goals", "rank,climb\nrepeat"),
        ];

        let mut sections: Vec<(String, serde_json::Map<String, Value>)> = Vec::new();
        for (section, field, value) in &originals {
            match sections.iter_mut().find(|(s, _)| s == section) {
                Some((_, fields)) => {
                    fields.insert((*field).to_string(), json!(value));
                }
                None => {
                    let mut fields = serde_json::Map::new();
                    fields.insert((*field).to_string(), json!(value));
                    sections.push(((*section).to_string(), fields));
                }
            }
        }

        let csv_text = responses_to_csv(&sections).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_text.as_bytes());
        let rows: Vec<(String, String, String)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].to_string(), r[1].to_string(), r[2].to_string())
            })
            .collect();

        assert_eq!(rows.len(), originals.len());
        for (section, field, value) in originals {
            assert!(rows
                .iter()
                .any(|(s, f, v)| s == section && f == field && v == value));
        }
    }

    #[test]
    fn list_values_flatten_into_one_cell() {
        assert_eq!(csv_cell_value(&json!(["SEO", "PPC"])), "SEO,PPC");
        assert_eq!(csv_cell_value(&json!(null)), "");
        assert_eq!(csv_cell_value(&json!(true)), "true");
        assert_eq!(csv_cell_value(&json!(42)), "42");
    }
}
