//! Conditional GET evaluation (ETag / Last-Modified).
//!
//! Evaluation order:
//!   1. If-Match (412 on mismatch)
//!   2. If-Unmodified-Since (412 if modified after), only when If-Match is absent
//!   3. If-None-Match (304 on exact ETag match)
//!   4. If-Modified-Since (304 if not modified since, second granularity)
//!
//! Never touches storage. Backends that support preconditions apply the same
//! rules on their side; either one firing short-circuits the body transfer.

use crate::models::object::{ObjectMetadata, Preconditions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Serve,
    NotModified,
    PreconditionFailed,
}

pub fn evaluate(preconditions: &Preconditions, meta: &ObjectMetadata) -> Outcome {
    let last_modified = meta.last_modified.timestamp();

    if let Some(expected) = preconditions.if_match.as_deref() {
        if expected != "*" && expected != meta.e_tag {
            return Outcome::PreconditionFailed;
        }
    } else if let Some(since) = preconditions.if_unmodified_since {
        if last_modified > since.timestamp() {
            return Outcome::PreconditionFailed;
        }
    }

    if preconditions.if_none_match.as_deref() == Some(meta.e_tag.as_str()) {
        return Outcome::NotModified;
    }

    if let Some(since) = preconditions.if_modified_since {
        if since.timestamp() >= last_modified {
            return Outcome::NotModified;
        }
    }

    Outcome::Serve
}
