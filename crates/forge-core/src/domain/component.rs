//! Component model: kinds, launch modes, manifest declarations and the
//! records the registry builds from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four component kinds a manifest can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Foreground UI unit.
    Launchable,
    /// Background unit (start/bind).
    Service,
    /// Broadcast recipient.
    Listener,
    /// Structured-data endpoint addressed by authority.
    Provider,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Launchable,
        ComponentKind::Service,
        ComponentKind::Listener,
        ComponentKind::Provider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Launchable => "launchable",
            ComponentKind::Service => "service",
            ComponentKind::Listener => "listener",
            ComponentKind::Provider => "provider",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Launch mode of a launchable component; selects the placeholder variant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Standard,
    SingleTop,
    SingleTask,
    SingleInstance,
}

impl LaunchMode {
    pub const ALL: [LaunchMode; 4] = [
        LaunchMode::Standard,
        LaunchMode::SingleTop,
        LaunchMode::SingleTask,
        LaunchMode::SingleInstance,
    ];
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaunchMode::Standard => "standard",
            LaunchMode::SingleTop => "single_top",
            LaunchMode::SingleTask => "single_task",
            LaunchMode::SingleInstance => "single_instance",
        };
        f.write_str(s)
    }
}

/// Dispatch filter as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDecl {
    pub action: String,

    #[serde(default)]
    pub priority: i32,
}

/// A component as declared in a host or patch manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDecl {
    pub kind: ComponentKind,

    /// Fully qualified name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_mode: Option<LaunchMode>,

    /// Provider authority (providers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,

    /// Dispatch filters (listeners only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterDecl>,
}

impl ComponentDecl {
    pub fn new(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            launch_mode: None,
            authority: None,
            filters: Vec::new(),
        }
    }

    pub fn with_launch_mode(mut self, mode: LaunchMode) -> Self {
        self.launch_mode = Some(mode);
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn with_filter(mut self, action: impl Into<String>, priority: i32) -> Self {
        self.filters.push(FilterDecl {
            action: action.into(),
            priority,
        });
        self
    }
}

/// Parsed filter of a patch-only listener, used to match implicit dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub action: String,
    pub priority: i32,

    /// Listener that owns this filter.
    pub component: String,
}

/// Registry view of one component after host/patch merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub kind: ComponentKind,
    pub qualified_name: String,
    pub declared_in_host: bool,
    pub launch_mode: Option<LaunchMode>,
    pub authority: Option<String>,
    pub filters: Vec<FilterRule>,
}
