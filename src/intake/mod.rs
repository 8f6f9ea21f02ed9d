use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{self, actions, AuditEntry};
use crate::auth::AuthenticatedUser;
use crate::error::PortalError;
use crate::shared::models::schema::{questionnaire_responses, questionnaires};
use crate::shared::models::NewQuestionnaireResponse;
use crate::shared::state::AppState;
use crate::shared::utils::run_db;

pub mod draft;
pub mod forms;

use draft::{ensure_draft_entities, DraftContext};
use forms::Values;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/intake/sections/:section_key", post(save_section))
        .route("/api/intake/submit", post(submit_intake))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRequest {
    #[serde(default)]
    pub values: Values,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub questionnaire_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSectionResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub company_id: Uuid,
    pub questionnaire_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: &'static str,
    pub company_id: Uuid,
    pub questionnaire_id: Uuid,
}

/// Persist one wizard section and return the draft context so the client
/// can continue the flow without re-resolving identity.
async fn save_section(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(section_key): Path<String>,
    Json(req): Json<IntakeRequest>,
) -> Result<Json<SaveSectionResponse>, PortalError> {
    forms::validate_partial(&req.values).map_err(PortalError::ValidationFailed)?;

    let section = forms::find_section(&section_key).ok_or_else(|| {
        PortalError::ValidationFailed("Unknown questionnaire section.".to_string())
    })?;

    let db_section_key = forms::storage_section_key(section.key).to_string();
    let payload = forms::section_payload(section, &req.values);
    let context = DraftContext {
        company_id: req.company_id,
        questionnaire_id: req.questionnaire_id,
    };
    let values = req.values;
    let user_id = user.user_id;

    let entities = run_db(&state.conn, move |conn| {
        let entities = ensure_draft_entities(conn, user_id, &values, context)?;

        let row = NewQuestionnaireResponse {
            questionnaire_id: entities.questionnaire_id,
            section_key: db_section_key.clone(),
            responses: Value::Object(payload),
            updated_by: user_id,
            updated_at: Utc::now(),
        };

        diesel::insert_into(questionnaire_responses::table)
            .values(&row)
            .on_conflict((
                questionnaire_responses::questionnaire_id,
                questionnaire_responses::section_key,
            ))
            .do_update()
            .set((
                questionnaire_responses::responses
                    .eq(excluded(questionnaire_responses::responses)),
                questionnaire_responses::updated_by
                    .eq(excluded(questionnaire_responses::updated_by)),
                questionnaire_responses::updated_at
                    .eq(excluded(questionnaire_responses::updated_at)),
            ))
            .execute(conn)
            .map_err(|e| {
                PortalError::upstream("Unable to save progress for this section.", e)
            })?;

        audit::record(
            conn,
            AuditEntry {
                company_id: entities.company_id,
                actor: user_id,
                action: actions::UPDATE_RESPONSE,
                target_type: "questionnaire",
                target_id: Some(entities.questionnaire_id.to_string()),
                details: json!({ "section": db_section_key }),
            },
        )
        .map_err(|e| PortalError::upstream("Unable to save progress for this section.", e))?;

        Ok(entities)
    })
    .await?;

    Ok(Json(SaveSectionResponse {
        status: "success",
        message: "Progress saved.",
        company_id: entities.company_id,
        questionnaire_id: entities.questionnaire_id,
    }))
}

/// Finalize the questionnaire: strict validation, every section written,
/// status flipped to submitted. The post-resolution writes share one
/// transaction so a late failure cannot leave a half-submitted
/// questionnaire behind.
async fn submit_intake(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<IntakeRequest>,
) -> Result<Json<SubmitResponse>, PortalError> {
    forms::validate_strict(&req.values).map_err(PortalError::ValidationFailed)?;

    let context = DraftContext {
        company_id: req.company_id,
        questionnaire_id: req.questionnaire_id,
    };
    let values = req.values;
    let user_id = user.user_id;

    let entities = run_db(&state.conn, move |conn| {
        let entities = ensure_draft_entities(conn, user_id, &values, context)?;
        let now = Utc::now();

        conn.transaction::<_, PortalError, _>(|conn| {
            for section in forms::SECTIONS {
                let row = NewQuestionnaireResponse {
                    questionnaire_id: entities.questionnaire_id,
                    section_key: forms::storage_section_key(section.key).to_string(),
                    responses: Value::Object(forms::section_payload(section, &values)),
                    updated_by: user_id,
                    updated_at: now,
                };

                diesel::insert_into(questionnaire_responses::table)
                    .values(&row)
                    .on_conflict((
                        questionnaire_responses::questionnaire_id,
                        questionnaire_responses::section_key,
                    ))
                    .do_update()
                    .set((
                        questionnaire_responses::responses
                            .eq(excluded(questionnaire_responses::responses)),
                        questionnaire_responses::updated_by
                            .eq(excluded(questionnaire_responses::updated_by)),
                        questionnaire_responses::updated_at
                            .eq(excluded(questionnaire_responses::updated_at)),
                    ))
                    .execute(conn)
                    .map_err(|e| {
                        PortalError::upstream("Unable to store questionnaire responses.", e)
                    })?;
            }

            diesel::update(
                questionnaires::table.filter(questionnaires::id.eq(entities.questionnaire_id)),
            )
            .set((
                questionnaires::status.eq("submitted"),
                questionnaires::submitted_at.eq(Some(now)),
                questionnaires::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(|e| PortalError::upstream("Failed to finalise the questionnaire.", e))?;

            audit::record(
                conn,
                AuditEntry {
                    company_id: entities.company_id,
                    actor: user_id,
                    action: actions::SUBMIT_QUESTIONNAIRE,
                    target_type: "questionnaire",
                    target_id: Some(entities.questionnaire_id.to_string()),
                    details: json!({
                        "selected_services": &entities.service_keys,
                        "submitted_at": now.to_rfc3339(),
                    }),
                },
            )
            .map_err(|e| PortalError::upstream("Failed to finalise the questionnaire.", e))?;

            Ok(())
        })?;

        Ok(entities)
    })
    .await?;

    Ok(Json(SubmitResponse {
        status: "success",
        company_id: entities.company_id,
        questionnaire_id: entities.questionnaire_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intake_request_tolerates_missing_context() {
        let req: IntakeRequest = serde_json::from_value(json!({
            "values": { "company_name": "Acme" }
        }))
        .unwrap();

        assert!(req.company_id.is_none());
        assert!(req.questionnaire_id.is_none());
        assert_eq!(req.values.get("company_name"), Some(&json!("Acme")));
    }

    #[test]
    fn intake_request_reads_camel_case_context() {
        let req: IntakeRequest = serde_json::from_value(json!({
            "values": {},
            "companyId": "7f3b1d66-8ef6-4b9a-b2f3-0e1d2c3b4a59",
            "questionnaireId": "1f0a2b3c-4d5e-6f70-8192-a3b4c5d6e7f8"
        }))
        .unwrap();

        assert!(req.company_id.is_some());
        assert!(req.questionnaire_id.is_some());
    }
}
