//! Authorization context: who is making a request, what kind of principal
//! they are, and what they're allowed to do.
//!
//! A command handler is handed an [`AuthorizationContext`] alongside the
//! command itself and uses it to gate the operation before any event is
//! appended: permission checks, feature-flag checks, and quota checks all
//! happen here, never inside a projection or after the fact.

use crate::identity::InstanceId;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::error::{ErrorCode, HasErrorCode};

/// Roles that make a subject an IAM member regardless of its explicit
/// permission grants, compared case-insensitively.
const IAM_MEMBER_ROLES: &[&str] = &["IAM_OWNER", "IAM_ADMIN", "SYSTEM_ADMIN"];

/// What kind of principal issued a request.
///
/// System tokens bypass per-user role checks, feature gates, and quota gates
/// entirely: they represent the IAM system acting on its own behalf, e.g.
/// running a migration or a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TokenType {
    /// A human user session.
    User,
    /// A long-lived service account credential.
    ServiceAccount,
    /// An internal system principal.
    System,
}

/// A single granted permission, scoped to the aggregate it applies to.
///
/// `resource` is `"*"` for an instance-wide grant, or an aggregate id for a
/// grant scoped to one organization/project/user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Permission {
    /// The permission name, e.g. `"user.write"`, `"org.member.manage"`.
    pub action: String,
    /// The aggregate this permission is scoped to, or `"*"` for instance-wide.
    pub resource: String,
}

impl Permission {
    /// Construct an instance-wide permission.
    #[must_use]
    pub fn instance_wide(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: "*".to_string(),
        }
    }

    /// Construct a permission scoped to a specific resource.
    #[must_use]
    pub fn scoped(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
        }
    }
}

/// Errors raised while gating a command against an [`AuthorizationContext`].
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The caller lacks a permission required for this action.
    #[error("permission denied: {action} on {resource}")]
    PermissionDenied {
        /// The permission action that was missing.
        action: String,
        /// The resource the caller tried to act on.
        resource: String,
    },

    /// The instance does not have a feature enabled that this command requires.
    #[error("feature disabled: {feature}")]
    FeatureDisabled {
        /// The feature flag that gated the request.
        feature: String,
    },

    /// The instance has exceeded a quota this command would consume.
    #[error("quota exceeded: {quota} (limit {limit}, current {current})")]
    QuotaExceeded {
        /// The quota name that was exceeded.
        quota: String,
        /// The configured limit.
        limit: u64,
        /// The current usage before this request.
        current: u64,
    },
}

impl HasErrorCode for AuthzError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::FeatureDisabled { .. } => ErrorCode::FeatureDisabled,
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
        }
    }
}

/// The resolved identity and grants behind one request.
///
/// Built once per request (typically from a validated token) and passed by
/// reference into command validation and handling; never mutated after
/// construction.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    instance_id: InstanceId,
    subject_id: String,
    token_type: TokenType,
    roles: HashSet<String>,
    permissions: HashSet<Permission>,
    features: HashSet<String>,
    features_configured: bool,
    quota_usage: HashMap<String, u64>,
    quota_limits: HashMap<String, u64>,
}

impl AuthorizationContext {
    /// Start building a context for `subject_id` within `instance_id`.
    #[must_use]
    pub fn builder(instance_id: InstanceId, subject_id: impl Into<String>) -> AuthorizationContextBuilder {
        AuthorizationContextBuilder {
            instance_id,
            subject_id: subject_id.into(),
            token_type: TokenType::User,
            roles: HashSet::new(),
            permissions: HashSet::new(),
            features: HashSet::new(),
            features_configured: false,
            quota_usage: HashMap::new(),
            quota_limits: HashMap::new(),
        }
    }

    /// The tenant this context is scoped to.
    #[must_use]
    pub const fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// The id of the principal making the request (user id, service account
    /// id, or a system identifier).
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// What kind of principal this is.
    #[must_use]
    pub const fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Whether this subject is an IAM member: a system token, or a user
    /// bearing one of [`IAM_MEMBER_ROLES`] (checked case-insensitively).
    /// IAM members are granted every instance permission regardless of
    /// their explicit permission set.
    #[must_use]
    pub fn is_iam_member(&self) -> bool {
        self.token_type == TokenType::System
            || self
                .roles
                .iter()
                .any(|role| IAM_MEMBER_ROLES.iter().any(|iam_role| role.eq_ignore_ascii_case(iam_role)))
    }

    /// The roles granted to this subject.
    #[must_use]
    pub fn roles(&self) -> &HashSet<String> {
        &self.roles
    }

    /// Whether this context grants `action` on `resource`, checking both a
    /// resource-scoped grant and an instance-wide (`"*"`) grant for the
    /// same action. System tokens and IAM members always pass.
    #[must_use]
    pub fn has_permission(&self, action: &str, resource: &str) -> bool {
        if self.is_iam_member() {
            return true;
        }
        self.permissions.contains(&Permission::scoped(action, resource))
            || self.permissions.contains(&Permission::instance_wide(action))
    }

    /// Require `action` on `resource`, or return
    /// [`AuthzError::PermissionDenied`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::PermissionDenied`] if the grant is missing.
    pub fn require_permission(&self, action: &str, resource: &str) -> Result<(), AuthzError> {
        if self.has_permission(action, resource) {
            Ok(())
        } else {
            Err(AuthzError::PermissionDenied {
                action: action.to_string(),
                resource: resource.to_string(),
            })
        }
    }

    /// Whether `feature` is enabled for this context's instance.
    ///
    /// System tokens always pass. When no instance feature metadata was
    /// configured on this context at all, every feature defaults to enabled
    /// (backward-compatible default for instances predating the feature);
    /// once metadata is present, only the features it names are enabled.
    #[must_use]
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.token_type == TokenType::System
            || !self.features_configured
            || self.features.contains(feature)
    }

    /// Require `feature` to be enabled, or return
    /// [`AuthzError::FeatureDisabled`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::FeatureDisabled`] if the feature is not enabled.
    pub fn require_feature(&self, feature: &str) -> Result<(), AuthzError> {
        if self.feature_enabled(feature) {
            Ok(())
        } else {
            Err(AuthzError::FeatureDisabled {
                feature: feature.to_string(),
            })
        }
    }

    /// Require that consuming one more unit of `quota` would not exceed its
    /// configured limit. A quota with no configured limit is unbounded.
    /// System tokens always pass.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::QuotaExceeded`] if usage is already at the
    /// limit.
    pub fn require_quota(&self, quota: &str) -> Result<(), AuthzError> {
        if self.token_type == TokenType::System {
            return Ok(());
        }
        let Some(&limit) = self.quota_limits.get(quota) else {
            return Ok(());
        };
        let current = self.quota_usage.get(quota).copied().unwrap_or(0);
        if current >= limit {
            Err(AuthzError::QuotaExceeded {
                quota: quota.to_string(),
                limit,
                current,
            })
        } else {
            Ok(())
        }
    }
}

/// Builder for [`AuthorizationContext`].
#[derive(Debug, Clone)]
pub struct AuthorizationContextBuilder {
    instance_id: InstanceId,
    subject_id: String,
    token_type: TokenType,
    roles: HashSet<String>,
    permissions: HashSet<Permission>,
    features: HashSet<String>,
    features_configured: bool,
    quota_usage: HashMap<String, u64>,
    quota_limits: HashMap<String, u64>,
}

impl AuthorizationContextBuilder {
    /// Set the principal type. Defaults to [`TokenType::User`].
    #[must_use]
    pub const fn token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Grant a role. Roles matching [`IAM_MEMBER_ROLES`] (case-insensitively)
    /// make the built context an IAM member.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Grant a set of roles.
    #[must_use]
    pub fn roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Grant a permission.
    #[must_use]
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// Grant a set of permissions.
    #[must_use]
    pub fn permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    /// Enable a feature. Calling this at least once marks this context's
    /// instance as having configured feature metadata, so any feature name
    /// not explicitly enabled is treated as disabled rather than defaulting
    /// to enabled.
    #[must_use]
    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self.features_configured = true;
        self
    }

    /// Record current usage against a quota.
    #[must_use]
    pub fn quota_usage(mut self, quota: impl Into<String>, used: u64) -> Self {
        self.quota_usage.insert(quota.into(), used);
        self
    }

    /// Configure a quota's limit.
    #[must_use]
    pub fn quota_limit(mut self, quota: impl Into<String>, limit: u64) -> Self {
        self.quota_limits.insert(quota.into(), limit);
        self
    }

    /// Finish building the context.
    #[must_use]
    pub fn build(self) -> AuthorizationContext {
        AuthorizationContext {
            instance_id: self.instance_id,
            subject_id: self.subject_id,
            token_type: self.token_type,
            roles: self.roles,
            permissions: self.permissions,
            features: self.features,
            features_configured: self.features_configured,
            quota_usage: self.quota_usage,
            quota_limits: self.quota_limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AuthorizationContext {
        AuthorizationContext::builder(InstanceId::new("acme"), "user-1")
            .permission(Permission::scoped("user.write", "user-1"))
            .feature("scim")
            .quota_limit("users", 10)
            .quota_usage("users", 10)
            .build()
    }

    #[test]
    fn scoped_permission_grants_matching_resource_only() {
        let c = ctx();
        assert!(c.has_permission("user.write", "user-1"));
        assert!(!c.has_permission("user.write", "user-2"));
    }

    #[test]
    fn instance_wide_permission_grants_any_resource() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "admin")
            .permission(Permission::instance_wide("user.write"))
            .build();
        assert!(c.has_permission("user.write", "user-999"));
    }

    #[test]
    fn system_token_bypasses_permission_checks() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "system")
            .token_type(TokenType::System)
            .build();
        assert!(c.require_permission("anything", "anywhere").is_ok());
    }

    #[test]
    fn iam_member_role_bypasses_permission_checks_case_insensitively() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "owner-1")
            .role("iam_owner")
            .build();
        assert!(c.is_iam_member());
        assert!(c.require_permission("anything", "anywhere").is_ok());
    }

    #[test]
    fn non_iam_role_does_not_bypass_permission_checks() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "user-2")
            .role("billing_viewer")
            .build();
        assert!(!c.is_iam_member());
        assert!(c.require_permission("user.write", "user-2").is_err());
    }

    #[test]
    fn feature_gate() {
        let c = ctx();
        assert!(c.require_feature("scim").is_ok());
        assert!(matches!(
            c.require_feature("saml"),
            Err(AuthzError::FeatureDisabled { .. })
        ));
    }

    #[test]
    fn feature_defaults_enabled_when_instance_has_no_feature_metadata() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "user-1").build();
        assert!(c.require_feature("actions").is_ok());
    }

    #[test]
    fn system_token_bypasses_feature_gate() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "system")
            .token_type(TokenType::System)
            .feature("scim")
            .build();
        assert!(c.require_feature("actions").is_ok());
    }

    #[test]
    fn quota_gate_trips_at_limit() {
        let c = ctx();
        assert!(matches!(
            c.require_quota("users"),
            Err(AuthzError::QuotaExceeded { .. })
        ));
    }

    #[test]
    fn system_token_bypasses_quota_gate() {
        let c = AuthorizationContext::builder(InstanceId::new("acme"), "system")
            .token_type(TokenType::System)
            .quota_limit("users", 10)
            .quota_usage("users", 10)
            .build();
        assert!(c.require_quota("users").is_ok());
    }

    #[test]
    fn quota_with_no_configured_limit_is_unbounded() {
        let c = ctx();
        assert!(c.require_quota("projects").is_ok());
    }

    #[test]
    fn error_codes_map_correctly() {
        assert_eq!(
            AuthzError::FeatureDisabled {
                feature: "x".into()
            }
            .code(),
            ErrorCode::FeatureDisabled
        );
    }
}
