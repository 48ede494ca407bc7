//! Plugin registry
//!
//! A plugin is a named capability record: a mandatory `info` block plus
//! optional dependency-generation and CLI surfaces. No inheritance; engines
//! feature-check the optional handles instead of dispatching virtually.

use crate::secret::SecretItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Whether a plugin implements a task or a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    Task,
    Hook,
}

/// Static description of a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub image: String,
    pub description: String,
    pub plugin_type: PluginType,
    /// For hooks: where in the lifecycle the hook runs, e.g. `pre`, `post`
    pub hook_type: Option<String>,
    /// Names of plugins this plugin must run after
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub plugin_version: String,
}

impl PluginInfo {
    pub fn task(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            description: String::new(),
            plugin_type: PluginType::Task,
            hook_type: None,
            depends_on: Vec::new(),
            plugin_version: "0.1.0".to_string(),
        }
    }

    pub fn hook(name: impl Into<String>, image: impl Into<String>, hook_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            description: String::new(),
            plugin_type: PluginType::Hook,
            hook_type: Some(hook_type.into()),
            depends_on: Vec::new(),
            plugin_version: "0.1.0".to_string(),
        }
    }
}

/// Input to dependency generation
#[derive(Debug, Clone, Default)]
pub struct GenerateDependenciesRequest {
    /// Ordered task config as authored on the job
    pub config: Vec<(String, String)>,
    /// Job asset files
    pub assets: HashMap<String, String>,
    /// Project config, upper-cased keys
    pub project_config: HashMap<String, String>,
    /// Secrets visible to the job
    pub secrets: Vec<SecretItem>,
}

/// Output of dependency generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedDependencies {
    /// URN this job writes to
    pub destination_urn: String,
    /// URNs this job reads from
    pub upstream_urns: Vec<String>,
}

/// Optional capability: derive a job's destination and upstream URNs from
/// its config and assets.
#[async_trait]
pub trait DependencyMod: Send + Sync {
    async fn generate_dependencies(
        &self,
        request: GenerateDependenciesRequest,
    ) -> crate::Result<GeneratedDependencies>;
}

/// Optional capability used only at authoring time; the core never calls
/// beyond feature-checking its presence.
pub trait CliMod: Send + Sync {}

/// A plugin entry: info plus optional capability handles
#[derive(Clone)]
pub struct Plugin {
    pub info: PluginInfo,
    pub dependency_mod: Option<Arc<dyn DependencyMod>>,
    pub cli_mod: Option<Arc<dyn CliMod>>,
}

impl Plugin {
    pub fn new(info: PluginInfo) -> Self {
        Self {
            info,
            dependency_mod: None,
            cli_mod: None,
        }
    }

    pub fn with_dependency_mod(mut self, dep_mod: Arc<dyn DependencyMod>) -> Self {
        self.dependency_mod = Some(dep_mod);
        self
    }

    pub fn with_cli_mod(mut self, cli_mod: Arc<dyn CliMod>) -> Self {
        self.cli_mod = Some(cli_mod);
        self
    }

    /// Whether this plugin can derive dependencies
    pub fn supports_dependency_resolution(&self) -> bool {
        self.dependency_mod.is_some()
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("info", &self.info)
            .field("dependency_mod", &self.dependency_mod.is_some())
            .field("cli_mod", &self.cli_mod.is_some())
            .finish()
    }
}

/// Registry of plugins, populated at process start and read-only afterwards.
/// Thread-safe; lookups return shared handles.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<Plugin>>>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its info name
    pub fn register(&self, plugin: Plugin) -> crate::Result<()> {
        let name = plugin.info.name.clone();
        if name.is_empty() {
            return Err(crate::Error::invalid_argument(
                "unable to register plugin",
                "plugin name cannot be empty",
            ));
        }
        let mut inner = self.inner.write().expect("plugin registry lock poisoned");
        if inner.contains_key(&name) {
            return Err(crate::Error::already_exists(
                "unable to register plugin",
                name,
            ));
        }
        inner.insert(name, Arc::new(plugin));
        Ok(())
    }

    /// Look up a plugin by name
    pub fn get_by_name(&self, name: &str) -> crate::Result<Arc<Plugin>> {
        self.inner
            .read()
            .expect("plugin registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| crate::Error::not_found("plugin not found", name))
    }

    /// All registered plugins
    pub fn list(&self) -> Vec<Arc<Plugin>> {
        self.inner
            .read()
            .expect("plugin registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}
