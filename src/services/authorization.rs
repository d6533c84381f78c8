//! Row-level-security style authorization.
//!
//! Each [`PolicyRule`] grants one action at one scope to a set of roles,
//! subject to a [`Condition`] evaluated against the principal's claims and the
//! target bucket. A request is allowed when any matching rule's condition
//! holds. Anonymous principals get read-class actions only on public buckets,
//! whatever the rules say.

use crate::{
    models::{
        bucket::Bucket,
        principal::{ANON_ROLE, AUTHENTICATED_ROLE, Principal, SERVICE_ROLE},
    },
    services::error::{GatewayError, GatewayResult},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, path::Path};
use tracing::debug;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    List,
    Create,
    Update,
    Delete,
    Empty,
}

impl Action {
    fn is_read_class(self) -> bool {
        matches!(self, Action::Read | Action::List)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "read",
            Action::List => "list",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Empty => "empty",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Bucket,
    Object,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    BucketPublic,
    /// The bucket's `owner` equals the principal's `sub` claim.
    BucketOwner,
    ClaimEquals {
        claim: String,
        value: Value,
    },
    AnyOf {
        conditions: Vec<Condition>,
    },
}

impl Condition {
    fn holds(&self, principal: &Principal, resource: &Resource<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::BucketPublic => resource.bucket.is_some_and(|b| b.public),
            Condition::BucketOwner => {
                let owner = resource.bucket.and_then(|b| b.owner.as_deref());
                match (owner, principal.subject()) {
                    (Some(owner), Some(sub)) => owner == sub,
                    _ => false,
                }
            }
            Condition::ClaimEquals { claim, value } => principal
                .claims()
                .and_then(|claims| claims.get(claim))
                .is_some_and(|actual| &actual == value),
            Condition::AnyOf { conditions } => {
                conditions.iter().any(|c| c.holds(principal, resource))
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PolicyRule {
    pub name: String,
    pub action: Action,
    #[serde(default)]
    pub scope: Scope,
    pub roles: Vec<String>,
    #[serde(default)]
    pub condition: Condition,
}

impl PolicyRule {
    pub fn new(
        name: &str,
        action: Action,
        scope: Scope,
        roles: &[&str],
        condition: Condition,
    ) -> Self {
        Self {
            name: name.to_string(),
            action,
            scope,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            condition,
        }
    }

    fn applies_to(&self, role: &str, action: Action, scope: Scope) -> bool {
        self.action == action && self.scope == scope && self.roles.iter().any(|r| r == role)
    }
}

/// What an action targets. A missing bucket means bucket-creation scope.
#[derive(Clone, Copy, Debug)]
pub struct Resource<'a> {
    pub bucket: Option<&'a Bucket>,
    pub object_key: Option<&'a str>,
}

impl<'a> Resource<'a> {
    pub fn bucket_creation() -> Self {
        Self {
            bucket: None,
            object_key: None,
        }
    }

    pub fn bucket(bucket: &'a Bucket) -> Self {
        Self {
            bucket: Some(bucket),
            object_key: None,
        }
    }

    pub fn object(bucket: &'a Bucket, key: &'a str) -> Self {
        Self {
            bucket: Some(bucket),
            object_key: Some(key),
        }
    }

    fn scope(&self) -> Scope {
        if self.object_key.is_some() {
            Scope::Object
        } else {
            Scope::Bucket
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AuthorizationDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: Some(reason.into()),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn into_result(self) -> GatewayResult<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(GatewayError::AccessDenied(self.reason.unwrap_or_default()))
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthorizationEngine {
    rules: Vec<PolicyRule>,
}

impl Default for AuthorizationEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl AuthorizationEngine {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Load a rule table from a JSON array of [`PolicyRule`].
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        let rules: Vec<PolicyRule> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing policy file {}", path.display()))?;
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn evaluate(
        &self,
        principal: &Principal,
        action: Action,
        resource: &Resource<'_>,
    ) -> AuthorizationDecision {
        // Service credentials bypass the table for `empty` only.
        if action == Action::Empty && principal.is_service() {
            return AuthorizationDecision::allow("service credential");
        }

        if principal.is_anonymous()
            && action.is_read_class()
            && !resource.bucket.is_some_and(|b| b.public)
        {
            return AuthorizationDecision::deny("anonymous reads require a public bucket");
        }

        let role = principal.role();
        let scope = resource.scope();
        let granted = self
            .rules
            .iter()
            .filter(|rule| rule.applies_to(role, action, scope))
            .find(|rule| rule.condition.holds(principal, resource));

        match granted {
            Some(rule) => AuthorizationDecision::allow(format!("policy `{}`", rule.name)),
            None => AuthorizationDecision::deny(format!(
                "no policy grants {action} on {scope:?} to role `{role}`"
            )),
        }
    }

    /// Evaluate and convert a denial into [`GatewayError::AccessDenied`].
    pub fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: &Resource<'_>,
    ) -> GatewayResult<()> {
        let decision = self.evaluate(principal, action, resource);
        if !decision.allowed {
            debug!(
                role = principal.role(),
                %action,
                bucket = resource.bucket.map(|b| b.id.as_str()),
                key = resource.object_key,
                reason = decision.reason.as_deref(),
                "authorization denied"
            );
        }
        decision.into_result()
    }
}

pub fn default_rules() -> Vec<PolicyRule> {
    use Action::*;
    use Scope::{Bucket as B, Object as O};

    let users = &[AUTHENTICATED_ROLE, SERVICE_ROLE][..];
    let authenticated = &[AUTHENTICATED_ROLE][..];

    vec![
        PolicyRule::new("buckets readable by users", Read, B, users, Condition::Always),
        PolicyRule::new("buckets listable by users", List, B, users, Condition::Always),
        PolicyRule::new("users create buckets", Create, B, users, Condition::Always),
        PolicyRule::new("owners update buckets", Update, B, authenticated, Condition::BucketOwner),
        PolicyRule::new("owners delete buckets", Delete, B, authenticated, Condition::BucketOwner),
        PolicyRule::new("owners empty buckets", Empty, B, authenticated, Condition::BucketOwner),
        PolicyRule::new("owners read objects", Read, O, authenticated, Condition::BucketOwner),
        PolicyRule::new("public objects readable", Read, O, &[ANON_ROLE], Condition::BucketPublic),
        PolicyRule::new("owners upload objects", Create, O, authenticated, Condition::BucketOwner),
        PolicyRule::new(
            "owners overwrite objects",
            Update,
            O,
            authenticated,
            Condition::BucketOwner,
        ),
        PolicyRule::new("owners delete objects", Delete, O, authenticated, Condition::BucketOwner),
    ]
}
