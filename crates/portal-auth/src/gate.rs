//! Route access decisions.
//!
//! `AccessGate::authorize` turns a session snapshot and a route's
//! requirements into `Allow`, `Redirect(target)` or `Pending`. Checks run in
//! a fixed order and the first failure decides the redirect:
//!
//! 1. no user: login page
//! 2. wrong role: the default page for the user's actual role
//! 3. wrong admin level: the generic authenticated page
//! 4. missing permission: the unauthorized page
//!
//! Redirect targets come from an injectable `RoutingTable`.

use crate::auth_fsm::SessionSnapshot;
use crate::{AuthError, AuthResult};
use portal_storage::{AdminLevel, KycStatus, Role, User};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Redirect(String),
    /// Startup has not resolved yet; render nothing and ask again later.
    Pending,
}

/// Action on a resource, optionally scoped to one market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub resource: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
}

impl Permission {
    pub const READ: &'static str = "READ";

    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            market_id: None,
        }
    }

    /// Read access to `resource`, the default for route guards.
    pub fn read(resource: impl Into<String>) -> Self {
        Self::new(resource, Self::READ)
    }

    pub fn in_market(mut self, market_id: impl Into<String>) -> Self {
        self.market_id = Some(market_id.into());
        self
    }

    /// `resource:action`, without the market scope.
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.market_id {
            Some(market) => write!(f, "{}@{}", self.key(), market),
            None => f.write_str(&self.key()),
        }
    }
}

/// Parses `resource`, `resource:action` or `resource:action@market`.
impl FromStr for Permission {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, market) = match s.split_once('@') {
            Some((body, market)) => (body, Some(market.trim())),
            None => (s, None),
        };
        let (resource, action) = match body.split_once(':') {
            Some((resource, action)) => (resource.trim(), action.trim()),
            None => (body.trim(), Self::READ),
        };

        if resource.is_empty() || action.is_empty() || market.is_some_and(str::is_empty) {
            return Err(AuthError::Validation(format!("invalid permission: {s:?}")));
        }

        let mut permission = Permission::new(resource, action.to_ascii_uppercase());
        permission.market_id = market.map(str::to_string);
        Ok(permission)
    }
}

/// Backend-specific permission lookup for users other than super admins.
pub trait PermissionPolicy: Send + Sync {
    fn is_granted(&self, user: &User, permission: &Permission) -> bool;
}

/// Grants nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPolicy;

impl PermissionPolicy for DenyAllPolicy {
    fn is_granted(&self, _user: &User, _permission: &Permission) -> bool {
        false
    }
}

/// Permissions granted per admin level.
///
/// Grant strings are `*`, `resource:*`, `resource:action`, or any of the
/// latter two suffixed with `@market` to limit them to one market.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticPolicy {
    grants: HashMap<AdminLevel, HashSet<String>>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, level: AdminLevel, permission: impl Into<String>) -> Self {
        self.grants.entry(level).or_default().insert(permission.into());
        self
    }
}

impl PermissionPolicy for StaticPolicy {
    fn is_granted(&self, user: &User, permission: &Permission) -> bool {
        let Some(grants) = user.admin_level.as_ref().and_then(|l| self.grants.get(l)) else {
            return false;
        };
        if grants.contains("*") {
            return true;
        }

        let exact = permission.key();
        let any_action = format!("{}:*", permission.resource);
        [exact, any_action].iter().any(|candidate| {
            grants.contains(candidate.as_str())
                || permission
                    .market_id
                    .as_ref()
                    .is_some_and(|m| grants.contains(&format!("{candidate}@{m}")))
        })
    }
}

fn default_admin_landing() -> BTreeMap<AdminLevel, String> {
    BTreeMap::from([
        (AdminLevel::SuperAdmin, "/dashboard/admin/super".to_string()),
        (AdminLevel::MarketMaster, "/dashboard/admin/market".to_string()),
        (AdminLevel::CityAdmin, "/dashboard/admin/city".to_string()),
    ])
}

fn default_kyc_landing() -> BTreeMap<KycStatus, String> {
    BTreeMap::from([
        (KycStatus::Verified, "/dashboard/vendor".to_string()),
        (KycStatus::Pending, "/dashboard/kyc-pending".to_string()),
    ])
}

/// Redirect targets and post-login landing pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTable {
    pub login: String,
    pub admin_home: String,
    pub stakeholder_home: String,
    /// Generic page for any authenticated user.
    pub authenticated_home: String,
    pub unauthorized: String,
    pub admin_landing: BTreeMap<AdminLevel, String>,
    pub kyc_landing: BTreeMap<KycStatus, String>,
    /// Stakeholder landing when the KYC status has no entry.
    pub stakeholder_fallback: String,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            admin_home: "/dashboard/admin".to_string(),
            stakeholder_home: "/dashboard".to_string(),
            authenticated_home: "/dashboard".to_string(),
            unauthorized: "/dashboard/unauthorized".to_string(),
            admin_landing: default_admin_landing(),
            kyc_landing: default_kyc_landing(),
            stakeholder_fallback: "/dashboard/profile".to_string(),
        }
    }
}

impl RoutingTable {
    /// Load a routing table; missing fields keep their defaults.
    pub fn load_from_file(path: &Path) -> AuthResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Config(format!("{}: {}", path.display(), e)))?;
        let table = serde_json::from_str(&content)
            .map_err(|e| AuthError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded routing table");
        Ok(table)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> AuthResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default page for a role, used when a route requires another role.
    pub fn home_for_role(&self, role: Role) -> &str {
        match role {
            Role::Admin => self.admin_home.as_str(),
            Role::Stakeholder => self.stakeholder_home.as_str(),
        }
    }

    /// Where to send a user right after login.
    pub fn landing_for(&self, user: &User) -> &str {
        match user.role {
            Role::Admin => user
                .admin_level
                .as_ref()
                .and_then(|level| self.admin_landing.get(level))
                .map(String::as_str)
                .unwrap_or(self.admin_home.as_str()),
            Role::Stakeholder => user
                .kyc_status
                .as_ref()
                .and_then(|status| self.kyc_landing.get(status))
                .map(String::as_str)
                .unwrap_or(self.stakeholder_fallback.as_str()),
        }
    }
}

/// What a route requires. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequirement {
    pub role: Option<Role>,
    pub admin_level: Option<AdminLevel>,
    pub permission: Option<Permission>,
}

impl AccessRequirement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn admin_level(mut self, level: AdminLevel) -> Self {
        self.admin_level = Some(level);
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }
}

/// Decides whether the current user may view a route.
#[derive(Clone)]
pub struct AccessGate {
    routes: RoutingTable,
    policy: Arc<dyn PermissionPolicy>,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(RoutingTable::default(), Arc::new(DenyAllPolicy))
    }
}

impl AccessGate {
    pub fn new(routes: RoutingTable, policy: Arc<dyn PermissionPolicy>) -> Self {
        Self { routes, policy }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Super admins hold every permission; everyone else asks the policy.
    pub fn has_permission(&self, user: &User, permission: &Permission) -> bool {
        if user.is_super_admin() {
            return true;
        }
        self.policy.is_granted(user, permission)
    }

    pub fn authorize(&self, snapshot: &SessionSnapshot, requirement: &AccessRequirement) -> Decision {
        if !snapshot.is_determinate() {
            return Decision::Pending;
        }

        let Some(user) = snapshot.user.as_ref() else {
            return Decision::Redirect(self.routes.login.clone());
        };

        if let Some(role) = requirement.role {
            if user.role != role {
                debug!(required = %role, actual = %user.role, "Role mismatch");
                return Decision::Redirect(self.routes.home_for_role(user.role).to_string());
            }
        }

        if let Some(level) = &requirement.admin_level {
            if user.admin_level.as_ref() != Some(level) {
                debug!(required = %level, "Admin level mismatch");
                return Decision::Redirect(self.routes.authenticated_home.clone());
            }
        }

        if let Some(permission) = &requirement.permission {
            if !self.has_permission(user, permission) {
                debug!(permission = %permission, "Permission denied");
                return Decision::Redirect(self.routes.unauthorized.clone());
            }
        }

        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_fsm::SessionState;

    fn user(role: Role, admin_level: Option<AdminLevel>, kyc: Option<KycStatus>) -> User {
        User {
            id: "u-1".to_string(),
            email: "a@x.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            role,
            admin_level,
            kyc_status: kyc,
        }
    }

    fn snapshot(user: Option<User>) -> SessionSnapshot {
        let state = if user.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        };
        SessionSnapshot {
            state,
            resolved: true,
            user,
            generation: 1,
        }
    }

    /// A policy that must never be consulted.
    struct PanickingPolicy;

    impl PermissionPolicy for PanickingPolicy {
        fn is_granted(&self, _user: &User, _permission: &Permission) -> bool {
            panic!("policy consulted");
        }
    }

    #[test]
    fn test_no_user_redirects_to_login() {
        let gate = AccessGate::default();
        let decision = gate.authorize(
            &snapshot(None),
            &AccessRequirement::new().role(Role::Admin),
        );
        assert_eq!(decision, Decision::Redirect("/login".to_string()));
    }

    #[test]
    fn test_stakeholder_on_admin_route_goes_to_stakeholder_home() {
        let gate = AccessGate::default();
        let stakeholder = user(Role::Stakeholder, None, Some(KycStatus::Verified));

        let decision = gate.authorize(
            &snapshot(Some(stakeholder)),
            &AccessRequirement::new().role(Role::Admin),
        );
        assert_eq!(decision, Decision::Redirect("/dashboard".to_string()));
    }

    #[test]
    fn test_admin_on_stakeholder_route_goes_to_admin_home() {
        let gate = AccessGate::default();
        let admin = user(Role::Admin, Some(AdminLevel::CityAdmin), None);

        let decision = gate.authorize(
            &snapshot(Some(admin)),
            &AccessRequirement::new().role(Role::Stakeholder),
        );
        assert_eq!(decision, Decision::Redirect("/dashboard/admin".to_string()));
    }

    #[test]
    fn test_admin_level_mismatch_goes_to_generic_page() {
        let gate = AccessGate::default();
        let admin = user(Role::Admin, Some(AdminLevel::CityAdmin), None);

        let decision = gate.authorize(
            &snapshot(Some(admin)),
            &AccessRequirement::new()
                .role(Role::Admin)
                .admin_level(AdminLevel::MarketMaster),
        );
        assert_eq!(decision, Decision::Redirect("/dashboard".to_string()));
    }

    #[test]
    fn test_role_is_checked_before_permission() {
        let gate = AccessGate::new(RoutingTable::default(), Arc::new(PanickingPolicy));
        let stakeholder = user(Role::Stakeholder, None, None);

        let decision = gate.authorize(
            &snapshot(Some(stakeholder)),
            &AccessRequirement::new()
                .role(Role::Admin)
                .permission(Permission::read("markets")),
        );
        assert_eq!(decision, Decision::Redirect("/dashboard".to_string()));
    }

    #[test]
    fn test_missing_permission_goes_to_unauthorized() {
        let gate = AccessGate::default();
        let admin = user(Role::Admin, Some(AdminLevel::MarketMaster), None);

        let decision = gate.authorize(
            &snapshot(Some(admin)),
            &AccessRequirement::new()
                .role(Role::Admin)
                .permission(Permission::read("reports")),
        );
        assert_eq!(
            decision,
            Decision::Redirect("/dashboard/unauthorized".to_string())
        );
    }

    #[test]
    fn test_super_admin_has_every_permission() {
        let gate = AccessGate::new(RoutingTable::default(), Arc::new(PanickingPolicy));
        let super_admin = user(Role::Admin, Some(AdminLevel::SuperAdmin), None);

        for permission in ["markets", "reports:DELETE", "vendors:WRITE@m-42"] {
            let permission: Permission = permission.parse().unwrap();
            assert!(gate.has_permission(&super_admin, &permission));
        }

        let decision = gate.authorize(
            &snapshot(Some(super_admin)),
            &AccessRequirement::new()
                .role(Role::Admin)
                .permission(Permission::new("anything", "DELETE")),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn test_super_admin_does_not_bypass_role_or_level() {
        let gate = AccessGate::default();
        let super_admin = user(Role::Admin, Some(AdminLevel::SuperAdmin), None);

        let decision = gate.authorize(
            &snapshot(Some(super_admin.clone())),
            &AccessRequirement::new().role(Role::Stakeholder),
        );
        assert_eq!(decision, Decision::Redirect("/dashboard/admin".to_string()));

        let decision = gate.authorize(
            &snapshot(Some(super_admin)),
            &AccessRequirement::new().admin_level(AdminLevel::MarketMaster),
        );
        assert_eq!(decision, Decision::Redirect("/dashboard".to_string()));
    }

    #[test]
    fn test_unresolved_or_authenticating_is_pending() {
        let gate = AccessGate::default();

        let mut unresolved = snapshot(None);
        unresolved.resolved = false;
        assert_eq!(
            gate.authorize(&unresolved, &AccessRequirement::new()),
            Decision::Pending
        );

        let mut authenticating = snapshot(None);
        authenticating.state = SessionState::Authenticating;
        assert_eq!(
            gate.authorize(&authenticating, &AccessRequirement::new()),
            Decision::Pending
        );
    }

    #[test]
    fn test_no_requirements_allows_any_user() {
        let gate = AccessGate::default();
        let stakeholder = user(Role::Stakeholder, None, None);
        assert_eq!(
            gate.authorize(&snapshot(Some(stakeholder)), &AccessRequirement::new()),
            Decision::Allow
        );
    }

    #[test]
    fn test_static_policy_wildcards_and_markets() {
        let policy = StaticPolicy::new()
            .grant(AdminLevel::MarketMaster, "vendors:*@m-1")
            .grant(AdminLevel::MarketMaster, "markets:READ")
            .grant(AdminLevel::NationalAdmin, "*");
        let gate = AccessGate::new(RoutingTable::default(), Arc::new(policy));

        let master = user(Role::Admin, Some(AdminLevel::MarketMaster), None);
        assert!(gate.has_permission(&master, &Permission::read("markets")));
        assert!(gate.has_permission(&master, &Permission::read("markets").in_market("m-9")));
        assert!(gate.has_permission(&master, &Permission::new("vendors", "WRITE").in_market("m-1")));
        assert!(!gate.has_permission(&master, &Permission::new("vendors", "WRITE").in_market("m-2")));
        assert!(!gate.has_permission(&master, &Permission::new("vendors", "WRITE")));

        let national = user(Role::Admin, Some(AdminLevel::NationalAdmin), None);
        assert!(gate.has_permission(&national, &Permission::new("reports", "DELETE")));

        let stakeholder = user(Role::Stakeholder, None, None);
        assert!(!gate.has_permission(&stakeholder, &Permission::read("markets")));
    }

    #[test]
    fn test_permission_parsing() {
        let p: Permission = "markets".parse().unwrap();
        assert_eq!(p, Permission::read("markets"));

        let p: Permission = "vendors:write@m-1".parse().unwrap();
        assert_eq!(p.action, "WRITE");
        assert_eq!(p.market_id.as_deref(), Some("m-1"));
        assert_eq!(p.to_string(), "vendors:WRITE@m-1");

        assert!(":READ".parse::<Permission>().is_err());
        assert!("markets:".parse::<Permission>().is_err());
        assert!("markets@".parse::<Permission>().is_err());
    }

    #[test]
    fn test_landing_routes() {
        let routes = RoutingTable::default();
        let cases = [
            (user(Role::Admin, Some(AdminLevel::SuperAdmin), None), "/dashboard/admin/super"),
            (user(Role::Admin, Some(AdminLevel::MarketMaster), None), "/dashboard/admin/market"),
            (user(Role::Admin, Some(AdminLevel::CityAdmin), None), "/dashboard/admin/city"),
            (user(Role::Admin, Some(AdminLevel::DistrictAdmin), None), "/dashboard/admin"),
            (user(Role::Admin, None, None), "/dashboard/admin"),
            (user(Role::Stakeholder, None, Some(KycStatus::Verified)), "/dashboard/vendor"),
            (user(Role::Stakeholder, None, Some(KycStatus::Pending)), "/dashboard/kyc-pending"),
            (user(Role::Stakeholder, None, Some(KycStatus::Rejected)), "/dashboard/profile"),
            (user(Role::Stakeholder, None, None), "/dashboard/profile"),
        ];

        for (user, expected) in cases {
            assert_eq!(routes.landing_for(&user), expected, "{:?}", user.role);
        }
    }

    #[test]
    fn test_routing_table_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(
            &path,
            r#"{"login": "/signin", "admin_landing": {"NATIONAL_ADMIN": "/dashboard/admin/national"}}"#,
        )
        .unwrap();

        let routes = RoutingTable::load_from_file(&path).unwrap();
        assert_eq!(routes.login, "/signin");
        assert_eq!(routes.unauthorized, "/dashboard/unauthorized");
        assert_eq!(
            routes.admin_landing.get(&AdminLevel::NationalAdmin).map(String::as_str),
            Some("/dashboard/admin/national")
        );
        assert!(!routes.admin_landing.contains_key(&AdminLevel::SuperAdmin));
    }

    #[test]
    fn test_routing_table_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let routes = RoutingTable::load_or_default(&dir.path().join("routes.json")).unwrap();
        assert_eq!(routes, RoutingTable::default());
    }
}
