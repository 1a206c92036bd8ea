//! Session data model shared by storage and auth.
//!
//! Field names follow the backend's camelCase JSON so a stored record and an
//! authority response deserialize into the same types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Top-level account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Stakeholder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Stakeholder => "STAKEHOLDER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "STAKEHOLDER" => Ok(Role::Stakeholder),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Sub-role hierarchy within `Role::Admin`.
///
/// Ordered from least to most privileged, so `SuperAdmin` is the maximum.
/// Levels this client does not know are kept verbatim and rank lowest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AdminLevel {
    SuperAdmin,
    NationalAdmin,
    DistrictAdmin,
    CityAdmin,
    MarketMaster,
    PseudoMarketMaster,
    Other(String),
}

impl AdminLevel {
    pub fn as_str(&self) -> &str {
        match self {
            AdminLevel::SuperAdmin => "SUPER_ADMIN",
            AdminLevel::NationalAdmin => "NATIONAL_ADMIN",
            AdminLevel::DistrictAdmin => "DISTRICT_ADMIN",
            AdminLevel::CityAdmin => "CITY_ADMIN",
            AdminLevel::MarketMaster => "MARKET_MASTER",
            AdminLevel::PseudoMarketMaster => "PSEUDO_MARKET_MASTER",
            AdminLevel::Other(raw) => raw,
        }
    }

    /// Position in the hierarchy; higher is more privileged.
    pub fn rank(&self) -> u8 {
        match self {
            AdminLevel::SuperAdmin => 6,
            AdminLevel::NationalAdmin => 5,
            AdminLevel::DistrictAdmin => 4,
            AdminLevel::CityAdmin => 3,
            AdminLevel::MarketMaster => 2,
            AdminLevel::PseudoMarketMaster => 1,
            AdminLevel::Other(_) => 0,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, AdminLevel::SuperAdmin)
    }
}

impl From<String> for AdminLevel {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "SUPER_ADMIN" => AdminLevel::SuperAdmin,
            "NATIONAL_ADMIN" => AdminLevel::NationalAdmin,
            "DISTRICT_ADMIN" => AdminLevel::DistrictAdmin,
            "CITY_ADMIN" => AdminLevel::CityAdmin,
            "MARKET_MASTER" => AdminLevel::MarketMaster,
            "PSEUDO_MARKET_MASTER" => AdminLevel::PseudoMarketMaster,
            _ => AdminLevel::Other(raw),
        }
    }
}

impl From<&str> for AdminLevel {
    fn from(raw: &str) -> Self {
        AdminLevel::from(raw.to_string())
    }
}

impl From<AdminLevel> for String {
    fn from(level: AdminLevel) -> Self {
        match level {
            AdminLevel::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl PartialOrd for AdminLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AdminLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.as_str().cmp(other.as_str()))
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stakeholder verification status. Only used to pick a landing page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KycStatus {
    Pending,
    Verified,
    Rejected,
    Other(String),
}

impl KycStatus {
    pub fn as_str(&self) -> &str {
        match self {
            KycStatus::Pending => "PENDING",
            KycStatus::Verified => "VERIFIED",
            KycStatus::Rejected => "REJECTED",
            KycStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for KycStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING" => KycStatus::Pending,
            "VERIFIED" => KycStatus::Verified,
            "REJECTED" => KycStatus::Rejected,
            _ => KycStatus::Other(raw),
        }
    }
}

impl From<KycStatus> for String {
    fn from(status: KycStatus) -> Self {
        match status {
            KycStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile of the logged-in user as returned by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_level: Option<AdminLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_status: Option<KycStatus>,
}

impl User {
    pub fn is_super_admin(&self) -> bool {
        self.admin_level
            .as_ref()
            .is_some_and(AdminLevel::is_super_admin)
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// An authenticated session.
///
/// Absence of a session is modelled as `Option<Session>`, so a value of this
/// type always carries both an access token and the user it belongs to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: User,
}

impl Session {
    /// Copy of this session with the access token replaced; user untouched.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: self.refresh_token.clone(),
            user: self.user.clone(),
        }
    }
}

// Tokens stay out of Debug output so they never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("user", &self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_level_ordering() {
        assert!(AdminLevel::SuperAdmin > AdminLevel::NationalAdmin);
        assert!(AdminLevel::NationalAdmin > AdminLevel::DistrictAdmin);
        assert!(AdminLevel::DistrictAdmin > AdminLevel::CityAdmin);
        assert!(AdminLevel::CityAdmin > AdminLevel::MarketMaster);
        assert!(AdminLevel::MarketMaster > AdminLevel::PseudoMarketMaster);
        assert!(AdminLevel::PseudoMarketMaster > AdminLevel::Other("REGIONAL".into()));
    }

    #[test]
    fn test_unknown_admin_level_is_preserved() {
        let level: AdminLevel = serde_json::from_str("\"REGIONAL_ADMIN\"").unwrap();
        assert_eq!(level, AdminLevel::Other("REGIONAL_ADMIN".to_string()));
        assert_eq!(serde_json::to_string(&level).unwrap(), "\"REGIONAL_ADMIN\"");
    }

    #[test]
    fn test_user_deserializes_backend_shape() {
        let json = r#"{
            "id": "u-1",
            "email": "a@x.com",
            "firstName": "Ada",
            "lastName": "Obi",
            "role": "STAKEHOLDER",
            "kycStatus": "PENDING"
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.role, Role::Stakeholder);
        assert_eq!(user.kyc_status, Some(KycStatus::Pending));
        assert_eq!(user.admin_level, None);
        assert_eq!(user.display_name(), "Ada Obi");
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let json = r#"{"id":"u","email":"e","role":"GUEST"}"#;
        assert!(serde_json::from_str::<User>(json).is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let user: User =
            serde_json::from_str(r#"{"id":"u","email":"e@x.com","role":"ADMIN"}"#).unwrap();
        assert_eq!(user.display_name(), "e@x.com");
    }

    #[test]
    fn test_session_debug_hides_tokens() {
        let user: User =
            serde_json::from_str(r#"{"id":"u","email":"e@x.com","role":"ADMIN"}"#).unwrap();
        let session = Session {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            user,
        };
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn test_with_access_token_keeps_user_and_refresh() {
        let user: User =
            serde_json::from_str(r#"{"id":"u","email":"e@x.com","role":"ADMIN"}"#).unwrap();
        let session = Session {
            access_token: "T1".into(),
            refresh_token: Some("R1".into()),
            user,
        };
        let refreshed = session.with_access_token("T2");
        assert_eq!(refreshed.access_token, "T2");
        assert_eq!(refreshed.refresh_token, session.refresh_token);
        assert_eq!(refreshed.user, session.user);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("guest".parse::<Role>().is_err());
    }
}
