//! Key layout for per-request state.
//!
//! Every physical key has the form `<prefix>.<flow>.<request>.<key>`. External
//! tools that inspect the backend keyspace rely on this layout, and cleanup
//! relies on no other request's keys matching `<prefix>.<flow>.<request>.*`.
//! That only holds if flow names and request ids never contain the separator,
//! so both are validated when a store is configured.

use std::fmt;

use crate::error::{Result, StateError};

/// Prefix used when a store is not given one explicitly.
pub const DEFAULT_PREFIX: &str = "flowstate";

/// Joins namespace segments and logical keys.
pub const SEPARATOR: char = '.';

/// Namespace scoping all state of one workflow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    path: String,
}

impl Namespace {
    /// Build the namespace of one request. Flow name and request id must be
    /// non-empty and free of the separator.
    pub fn new(prefix: &str, flow_name: &str, request_id: &str) -> Result<Self> {
        validate_segment(flow_name)?;
        validate_segment(request_id)?;
        Ok(Self {
            path: format!("{prefix}{SEPARATOR}{flow_name}{SEPARATOR}{request_id}"),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Physical key for a logical key, after validating it.
    pub fn key(&self, logical_key: &str) -> Result<String> {
        validate_key(logical_key)?;
        Ok(format!("{}{SEPARATOR}{logical_key}", self.path))
    }

    /// Glob pattern matching every physical key of this namespace.
    ///
    /// Glob metacharacters inside the namespace are escaped so that a request
    /// id such as `req-*` only ever matches its own keys.
    pub fn scan_pattern(&self) -> String {
        format!("{}{SEPARATOR}*", escape_glob(&self.path))
    }

    /// True if `physical_key` belongs to this namespace.
    pub fn contains(&self, physical_key: &str) -> bool {
        physical_key
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Namespace state held by a store between `configure` calls.
///
/// `configure` cannot fail, so a rejected flow name or request id is kept
/// here and returned by every data operation instead.
#[derive(Debug, Clone, Default)]
pub enum Scope {
    #[default]
    Unset,
    Ready(Namespace),
    Rejected {
        segment: String,
        reason: &'static str,
    },
}

impl Scope {
    pub fn configure(prefix: &str, flow_name: &str, request_id: &str) -> Self {
        match Namespace::new(prefix, flow_name, request_id) {
            Ok(namespace) => Scope::Ready(namespace),
            Err(StateError::InvalidNamespace { segment, reason }) => {
                Scope::Rejected { segment, reason }
            }
            Err(_) => Scope::Unset,
        }
    }

    /// The configured namespace, or the reason there is none.
    pub fn namespace(&self) -> Result<&Namespace> {
        match self {
            Scope::Unset => Err(StateError::NotConfigured),
            Scope::Ready(namespace) => Ok(namespace),
            Scope::Rejected { segment, reason } => Err(StateError::InvalidNamespace {
                segment: segment.clone(),
                reason: *reason,
            }),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scope::Ready(namespace) => Some(namespace.as_str()),
            _ => None,
        }
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    let reason = if segment.is_empty() {
        "segment must not be empty"
    } else if segment.contains(SEPARATOR) {
        "segment must not contain '.'"
    } else {
        return Ok(());
    };
    Err(StateError::InvalidNamespace {
        segment: segment.to_string(),
        reason,
    })
}

/// Reject logical keys that would blur the namespace boundary.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StateError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty",
        });
    }
    if key.contains(SEPARATOR) {
        return Err(StateError::InvalidKey {
            key: key.to_string(),
            reason: "key must not contain '.'",
        });
    }
    Ok(())
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
