// crates/analyst-runtime/src/registry.rs
// ============================================================================
// Module: Plugin Registry
// Description: Static catalog of vertical plugins.
// Purpose: Resolve plugins by name; populated only by explicit registration.
// Dependencies: analyst-core, thiserror
// ============================================================================

//! ## Overview
//! The registry is filled once at process start and read-only afterwards.
//! Registration validates the plugin name and parses its metadata namespace,
//! so a malformed namespace fails at startup rather than mid-run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use analyst_core::IdentifierError;
use analyst_core::MetaNamespace;
use thiserror::Error;

use crate::plugin::VerticalPlugin;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum plugin name length.
const MAX_PLUGIN_NAME_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A plugin with the same name is already registered.
    #[error("plugin already registered: {0}")]
    Duplicate(String),
    /// Plugin name is empty, too long, or uses unsupported characters.
    #[error("invalid plugin name: {0:?}")]
    InvalidName(String),
    /// Plugin metadata namespace failed validation.
    #[error("plugin {plugin} declares an invalid metadata namespace: {source}")]
    InvalidNamespace {
        /// Plugin name.
        plugin: String,
        /// Validation failure.
        source: IdentifierError,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registered plugin with its validated namespace.
#[derive(Clone)]
pub struct RegisteredPlugin {
    /// Plugin implementation.
    plugin: Arc<dyn VerticalPlugin>,
    /// Parsed metadata namespace.
    namespace: MetaNamespace,
}

impl RegisteredPlugin {
    /// Returns the plugin implementation.
    #[must_use]
    pub fn plugin(&self) -> &dyn VerticalPlugin {
        self.plugin.as_ref()
    }

    /// Returns the validated metadata namespace.
    #[must_use]
    pub const fn namespace(&self) -> &MetaNamespace {
        &self.namespace
    }
}

/// Name-indexed plugin catalog.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    /// Plugins keyed by name.
    plugins: BTreeMap<String, RegisteredPlugin>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the name is invalid or taken, or the
    /// metadata namespace does not parse.
    pub fn register(&mut self, plugin: Arc<dyn VerticalPlugin>) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        if !is_valid_plugin_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.plugins.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let namespace = MetaNamespace::parse(plugin.meta_namespace()).map_err(|source| {
            RegistryError::InvalidNamespace {
                plugin: name.clone(),
                source,
            }
        })?;
        self.plugins.insert(name, RegisteredPlugin {
            plugin,
            namespace,
        });
        Ok(())
    }

    /// Resolves a plugin by name; surrounding whitespace is ignored.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&RegisteredPlugin> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.plugins.get(name)
    }

    /// Returns registered plugins in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.values()
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true for names of `[a-z0-9_-]` characters within the length limit.
fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PLUGIN_NAME_LENGTH
        && name.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
}
