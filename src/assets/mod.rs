use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
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
use std::time::Duration;
use uuid::Uuid;

use crate::audit::{self, actions, AuditEntry};
use crate::auth::AuthenticatedUser;
use crate::error::PortalError;
use crate::membership::require_member;
use crate::shared::models::schema::assets;
use crate::shared::models::{Asset, NewAsset};
use crate::shared::state::AppState;
use crate::shared::utils::run_db;

/// Signed URLs live for five minutes in both directions.
const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 5);

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/assets/upload", post(request_upload))
        .route("/api/assets/:asset_id/download", get(request_download))
}

/// Object keys are namespaced by company and prefixed with a millisecond
/// timestamp. Collision avoidance, not a uniqueness guarantee.
pub fn object_path(company_id: Uuid, now_millis: i64, file_name: &str) -> String {
    format!("{company_id}/{now_millis}-{file_name}")
}

fn drive_client(state: &AppState) -> Result<&S3Client, PortalError> {
    state
        .drive
        .as_ref()
        .ok_or_else(|| PortalError::upstream("Unable to generate upload URL.", "object storage is not configured"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub company_id: Uuid,
    pub file_name: String,
    pub file_type: Option<String>,
    pub label: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub asset_id: Uuid,
    pub path: String,
    pub upload_url: String,
    pub expires_in: u64,
}

async fn request_upload(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, PortalError> {
    let file_name = req.file_name.trim().to_string();
    if file_name.is_empty() {
        return Err(PortalError::ValidationFailed(
            "File name is required.".to_string(),
        ));
    }

    let company_id = req.company_id;
    let user_id = user.user_id;

    run_db(&state.conn, move |conn| {
        require_member(
            conn,
            company_id,
            user_id,
            "You do not have permission to upload files for this company.",
        )?;
        Ok(())
    })
    .await?;

    let path = object_path(company_id, Utc::now().timestamp_millis(), &file_name);
    let bucket = state.bucket_name.clone();

    let presigning = PresigningConfig::expires_in(SIGNED_URL_TTL)
        .map_err(|e| PortalError::upstream("Unable to generate upload URL.", e))?;

    let mut put = drive_client(&state)?
        .put_object()
        .bucket(&bucket)
        .key(&path);
    if let Some(content_type) = &req.file_type {
        put = put.content_type(content_type);
    }
    let upload_url = put
        .presigned(presigning)
        .await
        .map_err(|e| PortalError::upstream("Unable to generate upload URL.", e))?
        .uri()
        .to_string();

    // Metadata is registered before any bytes move; an abandoned upload
    // leaves an inert row behind.
    let row = NewAsset {
        id: Uuid::new_v4(),
        company_id,
        bucket,
        path: path.clone(),
        label: Some(req.label.unwrap_or_else(|| file_name.clone())),
        kind: req.kind.clone(),
        created_by: user_id,
        created_at: Utc::now(),
    };
    let asset_id = row.id;
    let kind = req.kind;

    run_db(&state.conn, move |conn| {
        diesel::insert_into(assets::table)
            .values(&row)
            .execute(conn)
            .map_err(|e| PortalError::upstream("Failed to register asset metadata.", e))?;

        audit::record(
            conn,
            AuditEntry {
                company_id,
                actor: user_id,
                action: actions::ASSET_UPLOAD_REQUESTED,
                target_type: "asset",
                target_id: Some(asset_id.to_string()),
                details: json!({
                    "file_name": file_name,
                    "kind": kind,
                }),
            },
        )
        .map_err(|e| PortalError::upstream("Failed to register asset metadata.", e))?;

        Ok(())
    })
    .await?;

    Ok(Json(UploadResponse {
        asset_id,
        path,
        upload_url,
        expires_in: SIGNED_URL_TTL.as_secs(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub url: String,
}

/// 404 when the asset row is absent, 403 when it exists but the caller
/// is not a member of the owning company. No URL is signed in either
/// case.
async fn request_download(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(asset_id): Path<Uuid>,
) -> Result<Json<DownloadResponse>, PortalError> {
    let user_id = user.user_id;

    let asset = run_db(&state.conn, move |conn| {
        let asset: Asset = assets::table
            .filter(assets::id.eq(asset_id))
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Unable to generate download URL.", e))?
            .ok_or_else(|| PortalError::NotFound("Asset not found.".to_string()))?;

        require_member(
            conn,
            asset.company_id,
            user_id,
            "You do not have access to this asset.",
        )?;

        Ok(asset)
    })
    .await?;

    let presigning = PresigningConfig::expires_in(SIGNED_URL_TTL)
        .map_err(|e| PortalError::upstream("Unable to generate download URL.", e))?;

    let mut get_object = drive_client(&state)?
        .get_object()
        .bucket(&asset.bucket)
        .key(&asset.path);
    if let Some(label) = &asset.label {
        get_object = get_object
            .response_content_disposition(format!("attachment; filename=\"{label}\""));
    }
    let url = get_object
        .presigned(presigning)
        .await
        .map_err(|e| PortalError::upstream("Unable to generate download URL.", e))?
        .uri()
        .to_string();

    Ok(Json(DownloadResponse { url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_are_company_namespaced() {
        let company = Uuid::new_v4();
        let path = object_path(company, 1717000000123, "logo.png");
        assert_eq!(path, format!("{company}/1717000000123-logo.png"));
    }

    #[test]
    fn object_paths_keep_the_original_file_name() {
        let company = Uuid::new_v4();
        let path = object_path(company, 42, "brand guidelines.pdf");
        assert!(path.ends_with("42-brand guidelines.pdf"));
        assert!(path.starts_with(&company.to_string()));
    }
}
