use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::PortalError;
use crate::intake::forms::{self, Values};
use crate::membership::{self, CompanyRole};
use crate::shared::models::schema::{
    companies, company_members, company_services, questionnaires, services,
};
use crate::shared::models::{
    Company, NewCompany, NewCompanyMember, NewCompanyService, NewQuestionnaire, Service,
};

/// Per-field update intent for the company profile. A field the caller
/// did not send is kept, an explicit null (or blank string) clears it,
/// and a non-empty value replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl Patch<String> {
    pub fn from_values(values: &Values, key: &str) -> Self {
        match values.get(key) {
            None => Self::Keep,
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Self::Clear
                } else {
                    Self::Set(trimmed.to_string())
                }
            }
            Some(_) => Self::Clear,
        }
    }

    pub fn apply(self, current: Option<String>) -> Option<String> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompanyProfilePatch {
    pub website: Patch<String>,
    pub industry: Patch<String>,
    pub business_type: Patch<String>,
    pub country: Patch<String>,
    pub timezone: Patch<String>,
}

pub fn company_profile_patch(values: &Values) -> CompanyProfilePatch {
    CompanyProfilePatch {
        website: Patch::from_values(values, "website"),
        industry: Patch::from_values(values, "industry"),
        business_type: Patch::from_values(values, "business_type"),
        country: Patch::from_values(values, "country"),
        timezone: Patch::from_values(values, "timezone"),
    }
}

pub fn company_name(values: &Values) -> Option<String> {
    values
        .get("company_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn selected_display_services(values: &Values) -> Vec<String> {
    values
        .get("selected_services")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Multi-step wizard state: the only thing carried between requests.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftContext {
    pub company_id: Option<Uuid>,
    pub questionnaire_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct DraftEntities {
    pub company_id: Uuid,
    pub questionnaire_id: Uuid,
    pub service_keys: Vec<String>,
}

/// Create or update the company, membership, selected services and
/// questionnaire header for one intake save. Writes are sequential
/// upserts, safe to re-run.
pub fn ensure_draft_entities(
    conn: &mut PgConnection,
    user_id: Uuid,
    values: &Values,
    context: DraftContext,
) -> Result<DraftEntities, PortalError> {
    let now = Utc::now();
    let service_keys = forms::resolve_service_keys(&selected_display_services(values));
    let name = company_name(values);
    let patch = company_profile_patch(values);

    let company_id = match context.company_id {
        None => {
            let name = name.ok_or_else(|| {
                PortalError::ValidationFailed(
                    "Please provide the company name before saving progress.".to_string(),
                )
            })?;

            let row = NewCompany {
                id: Uuid::new_v4(),
                name,
                website: patch.website.apply(None),
                industry: patch.industry.apply(None),
                business_type: patch.business_type.apply(None),
                country: patch.country.apply(None),
                timezone: patch.timezone.apply(None),
                created_at: now,
                updated_at: now,
            };

            diesel::insert_into(companies::table)
                .values(&row)
                .execute(conn)
                .map_err(|e| PortalError::upstream("Failed to create the company profile.", e))?;

            // The creator becomes the company's first client admin.
            let member = NewCompanyMember {
                company_id: row.id,
                user_id,
                role: CompanyRole::ClientAdmin.as_str().to_string(),
                created_at: now,
            };

            diesel::insert_into(company_members::table)
                .values(&member)
                .on_conflict((company_members::company_id, company_members::user_id))
                .do_nothing()
                .execute(conn)
                .map_err(|e| {
                    PortalError::upstream(
                        "Unable to attach your account to the company profile.",
                        e,
                    )
                })?;

            row.id
        }
        Some(id) => {
            membership::require_member(
                conn,
                id,
                user_id,
                "You do not have access to this company.",
            )?;

            let current: Company = companies::table
                .filter(companies::id.eq(id))
                .first(conn)
                .optional()
                .map_err(|e| PortalError::upstream("Unable to update company information.", e))?
                .ok_or_else(|| PortalError::NotFound("Company not found.".to_string()))?;

            diesel::update(companies::table.filter(companies::id.eq(id)))
                .set((
                    companies::name.eq(name.unwrap_or(current.name)),
                    companies::website.eq(patch.website.apply(current.website)),
                    companies::industry.eq(patch.industry.apply(current.industry)),
                    companies::business_type.eq(patch.business_type.apply(current.business_type)),
                    companies::country.eq(patch.country.apply(current.country)),
                    companies::timezone.eq(patch.timezone.apply(current.timezone)),
                    companies::updated_at.eq(now),
                ))
                .execute(conn)
                .map_err(|e| PortalError::upstream("Unable to update company information.", e))?;

            id
        }
    };

    if !service_keys.is_empty() {
        let catalog: Vec<Service> = services::table
            .filter(services::key.eq_any(&service_keys))
            .load(conn)
            .map_err(|e| PortalError::upstream("Could not load service catalog.", e))?;

        let rows: Vec<NewCompanyService> = catalog
            .iter()
            .map(|service| NewCompanyService {
                company_id,
                service_id: service.id,
                status: "selected".to_string(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        diesel::insert_into(company_services::table)
            .values(&rows)
            .on_conflict((company_services::company_id, company_services::service_id))
            .do_update()
            .set((
                company_services::status.eq("selected"),
                company_services::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(|e| PortalError::upstream("Failed to connect services to the company.", e))?;
    }

    let questionnaire_id = match context.questionnaire_id {
        None => {
            let row = NewQuestionnaire {
                id: Uuid::new_v4(),
                company_id,
                version: 1,
                selected_services: service_keys.clone(),
                status: "in_progress".to_string(),
                started_by: user_id,
                created_at: now,
                updated_at: now,
            };

            diesel::insert_into(questionnaires::table)
                .values(&row)
                .execute(conn)
                .map_err(|e| PortalError::upstream("Failed to create questionnaire draft.", e))?;

            row.id
        }
        Some(id) => {
            // Scoped to the resolved company so a context carrying someone
            // else's questionnaire id cannot touch their draft.
            let updated = diesel::update(
                questionnaires::table
                    .filter(questionnaires::id.eq(id))
                    .filter(questionnaires::company_id.eq(company_id)),
            )
                .set((
                    questionnaires::selected_services.eq(service_keys.clone()),
                    questionnaires::status.eq("in_progress"),
                    questionnaires::updated_at.eq(now),
                ))
                .execute(conn)
                .map_err(|e| PortalError::upstream("Unable to update questionnaire draft.", e))?;

            if updated == 0 {
                return Err(PortalError::NotFound(
                    "Questionnaire draft not found.".to_string(),
                ));
            }

            id
        }
    };

    Ok(DraftEntities {
        company_id,
        questionnaire_id,
        service_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn absent_field_is_kept() {
        let patch = Patch::from_values(&Values::new(), "website");
        assert_eq!(patch, Patch::Keep);
        assert_eq!(
            patch.apply(Some("https://old.example".to_string())),
            Some("https://old.example".to_string())
        );
    }

    #[test]
    fn null_field_is_a_deliberate_clear() {
        let payload = values(&[("website", Value::Null)]);
        let patch = Patch::from_values(&payload, "website");
        assert_eq!(patch, Patch::Clear);
        assert_eq!(patch.apply(Some("https://old.example".to_string())), None);
    }

    #[test]
    fn blank_strings_clear_like_null() {
        let payload = values(&[("website", json!("   "))]);
        assert_eq!(Patch::from_values(&payload, "website"), Patch::Clear);
    }

    #[test]
    fn provided_value_replaces_and_trims() {
        let payload = values(&[("website", json!("  https://new.example "))]);
        let patch = Patch::from_values(&payload, "website");
        assert_eq!(patch, Patch::Set("https://new.example".to_string()));
        assert_eq!(
            patch.apply(None),
            Some("https://new.example".to_string())
        );
    }

    #[test]
    fn company_name_requires_substance() {
        assert_eq!(company_name(&values(&[("company_name", json!("  "))])), None);
        assert_eq!(
            company_name(&values(&[("company_name", json!(" Acme "))])),
            Some("Acme".to_string())
        );
    }

    #[test]
    fn selected_services_ignores_non_strings() {
        let payload = values(&[("selected_services", json!(["SEO", 7, "", "PPC"]))]);
        assert_eq!(
            selected_display_services(&payload),
            vec!["SEO".to_string(), "PPC".to_string()]
        );
    }

    #[test]
    fn draft_context_accepts_missing_fields() {
        let context: DraftContext = serde_json::from_value(json!({})).unwrap();
        assert!(context.company_id.is_none());
        assert!(context.questionnaire_id.is_none());

        let context: DraftContext = serde_json::from_value(json!({
            "companyId": "7f3b1d66-8ef6-4b9a-b2f3-0e1d2c3b4a59"
        }))
        .unwrap();
        assert!(context.company_id.is_some());
    }
}
