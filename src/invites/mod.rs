use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{self, actions, AuditEntry};
use crate::auth::AuthenticatedUser;
use crate::error::PortalError;
use crate::membership::{require_member, CompanyRole};
use crate::shared::models::schema::{companies, company_members, invites};
use crate::shared::models::{Invite, NewCompanyMember, NewInvite};
use crate::shared::state::AppState;
use crate::shared::utils::{is_valid_email, run_db};

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/companies/:company_id/invites", post(create_invite))
        .route("/api/invites/:token", get(invite_metadata))
        .route("/api/invites/accept", post(accept_invite))
}

/// Roles an invite may grant. Agency roles are provisioned out of band,
/// never through invite links.
fn invitable_role(role: &str) -> Option<CompanyRole> {
    match role.parse().ok()? {
        role @ (CompanyRole::ClientAdmin | CompanyRole::ClientMember | CompanyRole::Viewer) => {
            Some(role)
        }
        CompanyRole::AgencyAdmin | CompanyRole::AgencyMember => None,
    }
}

fn generate_invite_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

pub fn invite_link(site_url: &str, token: &str) -> String {
    format!("{site_url}/sign-in?invite={token}")
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub invite_link: String,
}

async fn create_invite(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<Json<CreateInviteResponse>, PortalError> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(PortalError::ValidationFailed(
            "Enter a valid email address".to_string(),
        ));
    }

    let role = match req.role.as_deref() {
        None | Some("") => CompanyRole::ClientMember,
        Some(raw) => invitable_role(raw)
            .ok_or_else(|| PortalError::ValidationFailed("Select a valid role".to_string()))?,
    };

    let token = generate_invite_token();
    let link = invite_link(&state.config.site.url, &token);
    let user_id = user.user_id;

    run_db(&state.conn, move |conn| {
        let caller_role = require_member(
            conn,
            company_id,
            user_id,
            "You need to be a member of this company to send invites.",
        )?;

        if !caller_role.can_invite() {
            return Err(PortalError::AuthorizationDenied(
                "You do not have permission to invite additional users.".to_string(),
            ));
        }

        let row = NewInvite {
            id: Uuid::new_v4(),
            company_id,
            email: email.clone(),
            role: role.as_str().to_string(),
            token: token.clone(),
            accepted: false,
            created_by: user_id,
            created_at: Utc::now(),
        };

        diesel::insert_into(invites::table)
            .values(&row)
            .execute(conn)
            .map_err(|e| {
                PortalError::upstream("Unable to create invite. Please try again.", e)
            })?;

        audit::record(
            conn,
            AuditEntry {
                company_id,
                actor: user_id,
                action: actions::INVITE_SENT,
                target_type: "invite",
                target_id: Some(row.id.to_string()),
                details: json!({
                    "email": email,
                    "role": role.as_str(),
                }),
            },
        )
        .map_err(|e| PortalError::upstream("Unable to create invite. Please try again.", e))?;

        Ok(())
    })
    .await?;

    Ok(Json(CreateInviteResponse {
        status: "success",
        message: "Invite created successfully. Share the link below.",
        invite_link: link,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteMetadata {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub company_id: Uuid,
    pub company_name: String,
    pub accepted: bool,
}

/// Pre-sign-in lookup so the sign-in page can show who the invite is for.
async fn invite_metadata(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<InviteMetadata>, PortalError> {
    let metadata = run_db(&state.conn, move |conn| {
        let row: Option<(Invite, String)> = invites::table
            .inner_join(companies::table)
            .filter(invites::token.eq(&token))
            .select((Invite::as_select(), companies::name))
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Unable to validate the invite token.", e))?;

        let (invite, company_name) = row.ok_or_else(|| {
            PortalError::NotFound("This invite link is invalid or has expired.".to_string())
        })?;

        Ok(InviteMetadata {
            id: invite.id,
            email: invite.email,
            role: invite.role,
            company_id: invite.company_id,
            company_name,
            accepted: invite.accepted,
        })
    })
    .await?;

    Ok(Json(metadata))
}

/// Outcome of presenting an invite token, decided before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptDecision {
    AlreadyAccepted,
    EmailMismatch { expected: String },
    Accept,
}

pub fn accept_decision(invite_accepted: bool, invite_email: &str, user_email: &str) -> AcceptDecision {
    if invite_accepted {
        return AcceptDecision::AlreadyAccepted;
    }

    if !invite_email.is_empty() && !invite_email.eq_ignore_ascii_case(user_email.trim()) {
        return AcceptDecision::EmailMismatch {
            expected: invite_email.to_string(),
        };
    }

    AcceptDecision::Accept
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteResponse {
    pub company_id: Uuid,
    pub role: String,
    pub message: &'static str,
}

async fn accept_invite(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<AcceptInviteRequest>,
) -> Result<Json<AcceptInviteResponse>, PortalError> {
    let token = req.token;
    let user_id = user.user_id;
    let user_email = user.email;

    let (company_id, role, message) = run_db(&state.conn, move |conn| {
        let invite: Invite = invites::table
            .filter(invites::token.eq(&token))
            .first(conn)
            .optional()
            .map_err(|e| PortalError::upstream("Unable to validate the invite token.", e))?
            .ok_or_else(|| {
                PortalError::NotFound("This invite link is invalid or has expired.".to_string())
            })?;

        match accept_decision(invite.accepted, &invite.email, &user_email) {
            AcceptDecision::AlreadyAccepted => Ok((
                invite.company_id,
                invite.role,
                "You already have access to this company.",
            )),
            AcceptDecision::EmailMismatch { expected } => {
                Err(PortalError::AuthorizationDenied(format!(
                    "This invite was sent to {expected}. Please sign in with that email address."
                )))
            }
            AcceptDecision::Accept => {
                let now = Utc::now();
                let member = NewCompanyMember {
                    company_id: invite.company_id,
                    user_id,
                    role: invite.role.clone(),
                    created_at: now,
                };

                diesel::insert_into(company_members::table)
                    .values(&member)
                    .on_conflict((company_members::company_id, company_members::user_id))
                    .do_update()
                    .set(company_members::role.eq(&invite.role))
                    .execute(conn)
                    .map_err(|e| {
                        PortalError::upstream("Failed to attach your account to the company.", e)
                    })?;

                diesel::update(invites::table.filter(invites::id.eq(invite.id)))
                    .set(invites::accepted.eq(true))
                    .execute(conn)
                    .map_err(|e| {
                        PortalError::upstream("Unable to mark this invite as accepted.", e)
                    })?;

                audit::record(
                    conn,
                    AuditEntry {
                        company_id: invite.company_id,
                        actor: user_id,
                        action: actions::INVITE_ACCEPTED,
                        target_type: "invite",
                        target_id: Some(invite.id.to_string()),
                        details: json!({ "email": invite.email }),
                    },
                )
                .map_err(|e| {
                    PortalError::upstream("Unable to mark this invite as accepted.", e)
                })?;

                Ok((
                    invite.company_id,
                    invite.role,
                    "You now have access to this company.",
                ))
            }
        }
    })
    .await?;

    Ok(Json(AcceptInviteResponse {
        company_id,
        role,
        message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_opaque_url_safe_hex() {
        let token = generate_invite_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let other = generate_invite_token();
        assert_ne!(token, other);
    }

    #[test]
    fn invite_link_embeds_the_token() {
        let link = invite_link("https://portal.example", "abc123");
        assert_eq!(link, "https://portal.example/sign-in?invite=abc123");
    }

    #[test]
    fn accepting_twice_is_idempotent() {
        let decision = accept_decision(true, "client@example.com", "someone-else@example.com");
        assert_eq!(decision, AcceptDecision::AlreadyAccepted);
    }

    #[test]
    fn email_match_is_case_insensitive() {
        assert_eq!(
            accept_decision(false, "Client@Example.com", "client@example.com"),
            AcceptDecision::Accept
        );
    }

    #[test]
    fn email_mismatch_names_the_expected_address() {
        match accept_decision(false, "client@example.com", "other@example.com") {
            AcceptDecision::EmailMismatch { expected } => {
                assert_eq!(expected, "client@example.com");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn agency_roles_cannot_be_granted_by_invite() {
        assert_eq!(invitable_role("client_member"), Some(CompanyRole::ClientMember));
        assert_eq!(invitable_role("client_admin"), Some(CompanyRole::ClientAdmin));
        assert_eq!(invitable_role("viewer"), Some(CompanyRole::Viewer));
        assert_eq!(invitable_role("agency_admin"), None);
        assert_eq!(invitable_role("agency_member"), None);
        assert_eq!(invitable_role("owner"), None);
    }
}
