//! Settings for exprsql.
//!
//! This module provides the [`Settings`] struct, which holds compiler
//! configuration, and [`LazySettings`], a globally-accessible, lazily
//! initialized settings instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// What to do with `IN` / `Contains` over a statically empty collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyInPolicy {
    /// Render a predicate that is never true (`x IN (NULL)`), or always true
    /// when negated (`1=1`).
    #[default]
    AlwaysFalse,
    /// Fail compilation with `SqlError::EmptyCollection`.
    Reject,
}

impl EmptyInPolicy {
    /// Parses a policy name (`always_false` or `reject`), case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "always_false" | "alwaysfalse" | "false" => Some(Self::AlwaysFalse),
            "reject" | "error" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// The complete set of compiler settings.
///
/// # Examples
///
/// ```
/// use exprsql_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.dialect, "mysql");
/// assert_eq!(settings.parameter_prefix, '@');
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log level filter (e.g. "info", "debug", "exprsql=trace").
    pub log_level: String,

    // ── Dialect ──────────────────────────────────────────────────────

    /// The SQL dialect to emit (currently only "mysql").
    pub dialect: String,
    /// The character prefixed to every placeholder.
    pub parameter_prefix: char,
    /// Name stem for anonymous placeholders (`p` gives `@p0`, `@p1`, ...).
    pub anonymous_parameter_name: String,
    /// The alias given to the first table of a query; joins take the next letters.
    pub first_table_alias: char,

    // ── Translation ──────────────────────────────────────────────────

    /// Policy for membership tests over statically empty collections.
    pub empty_in_policy: EmptyInPolicy,
    /// Whether calls whose target and arguments are all constant are folded
    /// to a literal at compile time.
    pub fold_constant_calls: bool,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            dialect: "mysql".to_string(),
            parameter_prefix: '@',
            anonymous_parameter_name: "p".to_string(),
            first_table_alias: 'a',
            empty_in_policy: EmptyInPolicy::AlwaysFalse,
            fold_constant_calls: true,
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup, then use
/// [`get`](LazySettings::get) to access the settings.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns the configured settings, or `None` before `configure`.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
