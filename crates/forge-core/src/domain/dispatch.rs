//! Dispatch requests and the redirect marker smuggled inside them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extras key under which the original target travels through a placeholder.
pub const REDIRECT_MARKER_KEY: &str = "forge.redirect.target";

/// An outgoing dispatch request (explicit target, or action-only implicit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Explicit target qualified name.
    pub target: Option<String>,

    pub action: Option<String>,

    #[serde(default)]
    pub extras: BTreeMap<String, String>,

    /// Ordered broadcast: result code/data flow from one receiver to the next.
    #[serde(default)]
    pub ordered: bool,
}

impl DispatchRequest {
    pub fn explicit(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn implicit(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn is_implicit(&self) -> bool {
        self.target.is_none()
    }

    /// Rewrite the target to `placeholder`, stashing the true name in a marker.
    pub fn redirect_to(&mut self, placeholder: &str, original: &str) {
        RedirectMarker::new(original).stash(self);
        self.target = Some(placeholder.to_string());
    }
}

/// Opaque key/value identifying the real (patch-only) target of a redirected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectMarker {
    pub original: String,
}

impl RedirectMarker {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
        }
    }

    pub fn read(request: &DispatchRequest) -> Option<Self> {
        request
            .extras
            .get(REDIRECT_MARKER_KEY)
            .filter(|name| !name.is_empty())
            .map(|name| Self::new(name.clone()))
    }

    pub fn stash(self, request: &mut DispatchRequest) {
        request
            .extras
            .insert(REDIRECT_MARKER_KEY.to_string(), self.original);
    }
}

/// Result threaded through an ordered broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub code: i32,
    pub data: Option<String>,
    pub aborted: bool,
}
