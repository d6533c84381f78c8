//! The identity making a request, resolved once from the bearer token.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ANON_ROLE: &str = "anon";
pub const AUTHENTICATED_ROLE: &str = "authenticated";
pub const SERVICE_ROLE: &str = "service_role";

/// Verified token claims. Unknown claims are kept for policy predicates.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub role: String,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Looks up a claim by name, including the well-known ones.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "sub" => self.sub.clone().map(Value::String),
            "role" => Some(Value::String(self.role.clone())),
            "exp" => Some(Value::from(self.exp)),
            other => self.extra.get(other).cloned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Principal {
    Anonymous,
    Authenticated(Claims),
    Service(Claims),
}

impl Principal {
    pub fn from_claims(claims: Claims) -> Self {
        match claims.role.as_str() {
            ANON_ROLE => Principal::Anonymous,
            SERVICE_ROLE => Principal::Service(claims),
            _ => Principal::Authenticated(claims),
        }
    }

    pub fn role(&self) -> &str {
        match self {
            Principal::Anonymous => ANON_ROLE,
            Principal::Authenticated(claims) | Principal::Service(claims) => &claims.role,
        }
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(claims) | Principal::Service(claims) => Some(claims),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims().and_then(|c| c.sub.as_deref())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Principal::Service(_))
    }
}
