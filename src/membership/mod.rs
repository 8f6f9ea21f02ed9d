use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PortalError;
use crate::shared::models::schema::company_members;

/// Closed set of company roles. Every authorization checkpoint matches on
/// this enum exhaustively; unknown strings in storage are treated as no
/// membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyRole {
    AgencyAdmin,
    AgencyMember,
    ClientAdmin,
    ClientMember,
    Viewer,
}

impl CompanyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgencyAdmin => "agency_admin",
            Self::AgencyMember => "agency_member",
            Self::ClientAdmin => "client_admin",
            Self::ClientMember => "client_member",
            Self::Viewer => "viewer",
        }
    }

    pub fn can_invite(&self) -> bool {
        match self {
            Self::AgencyAdmin | Self::AgencyMember | Self::ClientAdmin => true,
            Self::ClientMember | Self::Viewer => false,
        }
    }

    pub fn can_manage_secrets(&self) -> bool {
        match self {
            Self::AgencyAdmin | Self::ClientAdmin => true,
            Self::AgencyMember | Self::ClientMember | Self::Viewer => false,
        }
    }
}

impl std::str::FromStr for CompanyRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agency_admin" => Ok(Self::AgencyAdmin),
            "agency_member" => Ok(Self::AgencyMember),
            "client_admin" => Ok(Self::ClientAdmin),
            "client_member" => Ok(Self::ClientMember),
            "viewer" => Ok(Self::Viewer),
            _ => Err(()),
        }
    }
}

/// Look up the caller's role in a company. No caching: freshness over
/// latency, every mutating operation re-checks.
pub fn membership_role(
    conn: &mut PgConnection,
    company: Uuid,
    user: Uuid,
) -> Result<Option<CompanyRole>, diesel::result::Error> {
    let role: Option<String> = company_members::table
        .filter(company_members::company_id.eq(company))
        .filter(company_members::user_id.eq(user))
        .select(company_members::role)
        .first(conn)
        .optional()?;

    Ok(role.and_then(|r| match r.parse() {
        Ok(parsed) => Some(parsed),
        Err(()) => {
            warn!("unknown role '{r}' on membership ({company}, {user})");
            None
        }
    }))
}

pub fn require_member(
    conn: &mut PgConnection,
    company: Uuid,
    user: Uuid,
    denied_message: &str,
) -> Result<CompanyRole, PortalError> {
    membership_role(conn, company, user)
        .map_err(|e| PortalError::upstream("Unable to verify company access.", e))?
        .ok_or_else(|| PortalError::AuthorizationDenied(denied_message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_strings_round_trip() {
        for role in [
            CompanyRole::AgencyAdmin,
            CompanyRole::AgencyMember,
            CompanyRole::ClientAdmin,
            CompanyRole::ClientMember,
            CompanyRole::Viewer,
        ] {
            assert_eq!(role.as_str().parse::<CompanyRole>(), Ok(role));
        }
        assert!("owner".parse::<CompanyRole>().is_err());
    }

    #[test]
    fn invite_gate_matches_role_matrix() {
        assert!(CompanyRole::AgencyAdmin.can_invite());
        assert!(CompanyRole::AgencyMember.can_invite());
        assert!(CompanyRole::ClientAdmin.can_invite());
        assert!(!CompanyRole::ClientMember.can_invite());
        assert!(!CompanyRole::Viewer.can_invite());
    }

    #[test]
    fn secret_gate_is_admin_only() {
        assert!(CompanyRole::AgencyAdmin.can_manage_secrets());
        assert!(CompanyRole::ClientAdmin.can_manage_secrets());
        assert!(!CompanyRole::AgencyMember.can_manage_secrets());
        assert!(!CompanyRole::ClientMember.can_manage_secrets());
        // A viewer must never reach stored credentials, member or not.
        assert!(!CompanyRole::Viewer.can_manage_secrets());
    }
}
