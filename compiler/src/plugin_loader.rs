//! Plugin module loading
//!
//! The plugin pipeline does not load modules itself; it consumes a
//! [`ModuleLoader`] capability injected by the host. Two implementations
//! live here:
//!
//! - [`DynamicModuleLoader`] loads a compiled plugin module as a dynamic
//!   library and resolves the registry it exports through the
//!   `quartz_plugin_module` entry symbol (see `export_plugin_module!` in
//!   the `quartz-plugin` crate).
//! - [`StaticModuleLoader`] serves modules registered in-process, keyed by
//!   the same paths the reference table carries. Embedders that link their
//!   plugins at build time use this; so do tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use quartz_plugin::{PluginFactory, PluginModuleRegistry, PLUGIN_MODULE_ENTRY};

/// A loaded plugin module: resolves factories by qualified type name.
pub trait LoadedModule: Send + Sync + std::fmt::Debug {
    fn factory(&self, qualified_name: &str) -> Option<&dyn PluginFactory>;
}

/// Capability for turning a module path into a loaded module.
///
/// The pipeline calls this once per distinct path per compilation.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedModule>, ModuleLoadError>;
}

/// Errors that can occur when loading a plugin module
#[derive(Debug)]
pub enum ModuleLoadError {
    /// Library loading error (missing file, invalid format, unresolved deps)
    LoadError(PathBuf, String),

    /// Entry symbol resolution or invocation error
    EntryError(PathBuf, String),

    /// Static loader has no module registered at the path
    NotRegistered(PathBuf),
}

impl std::fmt::Display for ModuleLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleLoadError::LoadError(path, e) => {
                write!(f, "failed to load plugin module {}: {}", path.display(), e)
            }
            ModuleLoadError::EntryError(path, e) => {
                write!(f, "invalid plugin module {}: {}", path.display(), e)
            }
            ModuleLoadError::NotRegistered(path) => {
                write!(f, "no plugin module registered at {}", path.display())
            }
        }
    }
}

impl std::error::Error for ModuleLoadError {}

/// A plugin module loaded from a dynamic library.
///
/// Field order matters: the registry holds factories whose code lives in
/// the library, so it must drop before the library is unloaded.
struct DynamicModule {
    registry: Box<PluginModuleRegistry>,
    #[allow(dead_code)]
    library: Library,
}

impl std::fmt::Debug for DynamicModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicModule").finish_non_exhaustive()
    }
}

impl LoadedModule for DynamicModule {
    fn factory(&self, qualified_name: &str) -> Option<&dyn PluginFactory> {
        self.registry.factory(qualified_name)
    }
}

/// Loads plugin modules via the platform dynamic linker.
#[derive(Debug, Default)]
pub struct DynamicModuleLoader;

impl DynamicModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

type PluginModuleEntryFn = unsafe extern "C" fn() -> *mut PluginModuleRegistry;

impl ModuleLoader for DynamicModuleLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedModule>, ModuleLoadError> {
        let library = unsafe {
            Library::new(path)
                .map_err(|e| ModuleLoadError::LoadError(path.to_path_buf(), e.to_string()))?
        };

        let registry = unsafe {
            let entry: libloading::Symbol<PluginModuleEntryFn> = library
                .get(PLUGIN_MODULE_ENTRY.as_bytes())
                .map_err(|e| {
                    ModuleLoadError::EntryError(
                        path.to_path_buf(),
                        format!(
                            "entry symbol '{}' not found (is export_plugin_module! used?): {}",
                            PLUGIN_MODULE_ENTRY, e
                        ),
                    )
                })?;

            let raw = entry();
            if raw.is_null() {
                return Err(ModuleLoadError::EntryError(
                    path.to_path_buf(),
                    "entry symbol returned a null registry".to_string(),
                ));
            }

            // Ownership of the registry was handed over by the entry symbol.
            Box::from_raw(raw)
        };

        log::info!(
            "loaded plugin module {} with {} factories",
            path.display(),
            registry.len()
        );

        Ok(Arc::new(DynamicModule { registry, library }))
    }
}

/// A plugin module registered in-process.
struct StaticModule {
    registry: PluginModuleRegistry,
}

impl std::fmt::Debug for StaticModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticModule").finish_non_exhaustive()
    }
}

impl LoadedModule for StaticModule {
    fn factory(&self, qualified_name: &str) -> Option<&dyn PluginFactory> {
        self.registry.factory(qualified_name)
    }
}

/// Serves plugin modules registered up-front, without touching the
/// filesystem. Registration happens before the loader is handed to a
/// pipeline.
#[derive(Default)]
pub struct StaticModuleLoader {
    modules: HashMap<PathBuf, Arc<StaticModule>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module's factory registry under a path.
    pub fn register_module(&mut self, path: impl Into<PathBuf>, registry: PluginModuleRegistry) {
        self.modules
            .insert(path.into(), Arc::new(StaticModule { registry }));
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedModule>, ModuleLoadError> {
        match self.modules.get(path) {
            Some(module) => Ok(Arc::clone(module) as Arc<dyn LoadedModule>),
            None => Err(ModuleLoadError::NotRegistered(path.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_plugin::{CompilerPlugin, PluginResult};

    struct NoopPlugin;

    impl CompilerPlugin for NoopPlugin {
        fn name(&self) -> &str {
            "Noop"
        }
    }

    struct NoopFactory;

    impl PluginFactory for NoopFactory {
        fn create(&self) -> PluginResult<Box<dyn CompilerPlugin>> {
            Ok(Box::new(NoopPlugin))
        }
    }

    #[test]
    fn test_static_loader_roundtrip() {
        let mut registry = PluginModuleRegistry::new();
        registry
            .register("acme.tools.Noop", Box::new(NoopFactory))
            .unwrap();

        let mut loader = StaticModuleLoader::new();
        loader.register_module("libs/acme_tools.so", registry);
        assert_eq!(loader.len(), 1);
        assert!(!loader.is_empty());

        let module = loader.load(Path::new("libs/acme_tools.so")).unwrap();
        assert!(module.factory("acme.tools.Noop").is_some());
        assert!(module.factory("acme.tools.Other").is_none());
    }

    #[test]
    fn test_static_loader_unknown_path() {
        let loader = StaticModuleLoader::new();
        let err = loader.load(Path::new("libs/missing.so")).unwrap_err();
        assert!(matches!(err, ModuleLoadError::NotRegistered(_)));
        assert!(err.to_string().contains("libs/missing.so"));
    }

    #[test]
    fn test_dynamic_loader_missing_file() {
        let loader = DynamicModuleLoader::new();
        let err = loader
            .load(Path::new("/nonexistent/plugin_module.so"))
            .unwrap_err();
        assert!(matches!(err, ModuleLoadError::LoadError(..)));
    }
}
