use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{self, actions, AuditEntry};
use crate::auth::AuthenticatedUser;
use crate::error::PortalError;
use crate::membership::require_member;
use crate::shared::models::schema::secrets;
use crate::shared::models::{NewSecret, Secret};
use crate::shared::state::AppState;
use crate::shared::utils::run_db;

pub mod vault;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/companies/:company_id/secrets", post(create_secret))
        .route("/api/secrets/:secret_id/reveal", get(reveal_secret))
}

#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub label: Option<String>,
    pub secret_type: Option<String>,
    pub secret_value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSecretResponse {
    pub status: &'static str,
    pub message: &'static str,
}

fn required_field(value: Option<String>, message: &str) -> Result<String, PortalError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PortalError::ValidationFailed(message.to_string()))
}

async fn create_secret(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
    Json(req): Json<CreateSecretRequest>,
) -> Result<Json<CreateSecretResponse>, PortalError> {
    let label = required_field(req.label, "Label is required.")?;
    let secret_type = required_field(req.secret_type, "Select a secret type.")?;
    let secret_value = required_field(req.secret_value, "Secret value cannot be empty.")?;

    // The vault owns the passphrase-derived key; the handler never sees
    // ciphertext internals and the plaintext goes no further than here.
    let encrypted_value = vault::encrypt_value(&state.config.vault.passphrase, &secret_value)
        .map_err(|e| PortalError::upstream("Unable to securely store the secret.", e))?;

    let user_id = user.user_id;

    run_db(&state.conn, move |conn| {
        let role = require_member(
            conn,
            company_id,
            user_id,
            "You do not have access to this company.",
        )?;

        if !role.can_manage_secrets() {
            return Err(PortalError::AuthorizationDenied(
                "Only admins can store secure credentials.".to_string(),
            ));
        }

        let row = NewSecret {
            id: Uuid::new_v4(),
            company_id,
            label: label.clone(),
            secret_type: secret_type.clone(),
            encrypted_value,
            created_by: user_id,
            created_at: Utc::now(),
        };

        diesel::insert_into(secrets::table)
            .values(&row)
            .execute(conn)
            .map_err(|e| PortalError::upstream("Unable to securely store the secret.", e))?;

        audit::record(
            conn,
            AuditEntry {
                company_id,
                actor: user_id,
                action: actions::SECRET_CREATED,
                target_type: "secret",
                target_id: Some(row.id.to_string()),
                details: json!({
                    "label": label,
                    "secret_type": secret_type,
                }),
            },
        )
        .map_err(|e| PortalError::upstream("Unable to securely store the secret.", e))?;

        Ok(())
    })
    .await?;

    Ok(Json(CreateSecretResponse {
        status: "success",
        message: "Secret stored securely.",
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealSecretResponse {
    pub label: String,
    pub secret_type: String,
    pub secret_value: String,
}

/// Decrypt and return one credential. Plaintext exists only in this
/// response body; it is never persisted or logged.
async fn reveal_secret(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(secret_id): Path<Uuid>,
) -> Result<Json<RevealSecretResponse>, PortalError> {
    let user_id = user.user_id;

    let secret = run_db(&state.conn, move |conn| {
        let secret: Secret = secrets::table
            .filter(secrets::id.eq(secret_id))
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Failed to decrypt secret.", e))?
            .ok_or_else(|| PortalError::NotFound("Secret not found.".to_string()))?;

        let role = require_member(
            conn,
            secret.company_id,
            user_id,
            "You do not have access to this secret.",
        )?;

        if !role.can_manage_secrets() {
            return Err(PortalError::AuthorizationDenied(
                "Only admins can view stored secrets.".to_string(),
            ));
        }

        Ok(secret)
    })
    .await?;

    let secret_value = vault::decrypt_value(&state.config.vault.passphrase, &secret.encrypted_value)
        .map_err(|e| PortalError::upstream("Failed to decrypt secret.", e))?;

    Ok(Json(RevealSecretResponse {
        label: secret.label,
        secret_type: secret.secret_type,
        secret_value,
    }))
}
