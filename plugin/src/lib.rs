//! Build-time plugin contract for the quartz compiler
//!
//! This crate is the boundary between the compiler and externally-compiled
//! plugin modules. A plugin module ships as a dynamic library that exports a
//! factory registry through [`export_plugin_module!`]; the compiler loads
//! the module, resolves a factory by the qualified name declared on the
//! compiling unit, and drives the resulting [`CompilerPlugin`] through two
//! extension points:
//!
//! 1. **before compile** — the plugin may replace the program representation
//!    (rewrite, add or remove source units) before the main compile pass.
//! 2. **after compile** — the plugin observes the final representation and
//!    the emitted artifact streams.
//!
//! # Writing a plugin
//!
//! ```rust,ignore
//! use quartz_plugin::{
//!     export_plugin_module, BeforeCompileContext, CompilerPlugin, PluginFactory,
//!     PluginModuleRegistry, PluginResult,
//! };
//!
//! struct Banner;
//!
//! impl CompilerPlugin for Banner {
//!     fn name(&self) -> &str {
//!         "Banner"
//!     }
//! }
//!
//! struct BannerFactory;
//!
//! impl PluginFactory for BannerFactory {
//!     fn create(&self) -> PluginResult<Box<dyn CompilerPlugin>> {
//!         Ok(Box::new(Banner))
//!     }
//! }
//!
//! fn register(registry: &mut PluginModuleRegistry) {
//!     registry
//!         .register("acme.banner.Banner", Box::new(BannerFactory))
//!         .expect("unique plugin names");
//! }
//!
//! export_plugin_module!(register);
//! ```

use std::fmt;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

use indexmap::IndexMap;

use diagnostics::Diagnostics;
use program::{ModuleReference, Program, TypeDef, TypeRef};

/// Module name under which the plugin framework publishes its own types.
pub const FRAMEWORK_MODULE: &str = "quartz.plugin";

/// Qualified name of the declarative binding capability. A marker on the
/// compiling unit counts as a plugin binding when its declared type derives
/// from this type.
pub const PLUGIN_BINDING_TYPE: &str = "quartz.plugin.PluginBinding";

/// Qualified name of the behavioral plugin capability produced by a
/// binding's factory.
pub const COMPILER_PLUGIN_TYPE: &str = "quartz.plugin.CompilerPlugin";

/// Name of the C-ABI entry symbol a dynamic plugin module exports.
pub const PLUGIN_MODULE_ENTRY: &str = "quartz_plugin_module";

/// The framework module's own reference metadata.
///
/// Compiling units that use plugins normally reference this module
/// themselves; when one does not, discovery derives a representation that
/// adds this reference so the binding capability still resolves. The path
/// is empty: the framework is never loaded as a plugin module.
pub fn framework_reference() -> ModuleReference {
    ModuleReference::new(FRAMEWORK_MODULE, "")
        .with_type(TypeDef::new(PLUGIN_BINDING_TYPE))
        .with_type(
            TypeDef::new(COMPILER_PLUGIN_TYPE)
                .with_base(TypeRef::new(FRAMEWORK_MODULE, PLUGIN_BINDING_TYPE)),
        )
}

/// The binding capability as a type reference.
pub fn binding_capability() -> TypeRef {
    TypeRef::new(FRAMEWORK_MODULE, PLUGIN_BINDING_TYPE)
}

/// Error raised by a plugin factory or hook.
///
/// The rendered text is embedded verbatim in the diagnostic the compiler
/// reports, so messages should carry everything a build log needs.
#[derive(Debug, Clone)]
pub struct PluginError {
    message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<String> for PluginError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for PluginError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

/// An emitted artifact handed to after-compile hooks: readable, writable
/// and seekable. The stream is fully written but its position is arbitrary;
/// a hook wanting to inspect content must seek first.
pub trait ArtifactStream: Read + Write + Seek {}

impl<T: Read + Write + Seek + ?Sized> ArtifactStream for T {}

/// Context passed to before-compile hooks.
///
/// Carries the current program representation and the diagnostics list
/// shared by every hook in the phase. The hook returns the replacement
/// representation (or `None` for "unchanged") rather than mutating the
/// context, so what a hook changed is always explicit.
pub struct BeforeCompileContext<'a> {
    program: Arc<Program>,
    pub diagnostics: &'a mut Diagnostics,
}

impl<'a> BeforeCompileContext<'a> {
    pub fn new(program: Arc<Program>, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            program,
            diagnostics,
        }
    }

    /// The representation as the previous hook left it.
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }
}

/// Context passed to after-compile hooks.
///
/// The representation is final here — replacing it would have no effect on
/// the compiled output, so only a shared reference is exposed. The two
/// artifact streams are owned by the host and stay open; hooks must not
/// assume anything about their current position.
pub struct AfterCompileContext<'a> {
    program: &'a Arc<Program>,
    pub diagnostics: &'a mut Diagnostics,
    pub assembly: &'a mut dyn ArtifactStream,
    pub symbols: &'a mut dyn ArtifactStream,
}

impl<'a> AfterCompileContext<'a> {
    pub fn new(
        program: &'a Arc<Program>,
        diagnostics: &'a mut Diagnostics,
        assembly: &'a mut dyn ArtifactStream,
        symbols: &'a mut dyn ArtifactStream,
    ) -> Self {
        Self {
            program,
            diagnostics,
            assembly,
            symbols,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        self.program
    }
}

/// A live build-time plugin.
///
/// # Lifecycle
///
/// 1. The factory named by a binding on the compiling unit creates the
///    instance.
/// 2. `before_compile` runs once, before the main compile pass.
/// 3. `after_compile` runs once, with the final representation and the
///    emitted artifacts.
/// 4. `dispose` runs exactly once when the compilation ends, on every
///    success and failure path.
///
/// Returning `Err` from a hook records a diagnostic and stops the
/// remaining hooks of that phase; it never aborts the other phase or
/// disposal.
pub trait CompilerPlugin: Send + Sync {
    /// Returns the plugin name used in diagnostics and logs.
    fn name(&self) -> &str;

    /// Observe or rewrite the representation before the compile pass.
    ///
    /// Return `Ok(Some(program))` to replace the representation seen by the
    /// compiler and by later plugins, `Ok(None)` to leave it unchanged.
    fn before_compile(
        &mut self,
        ctx: BeforeCompileContext<'_>,
    ) -> PluginResult<Option<Arc<Program>>> {
        let _ = ctx;
        Ok(None)
    }

    /// Observe the final representation and the emitted artifacts.
    fn after_compile(&mut self, ctx: AfterCompileContext<'_>) -> PluginResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Release whatever the plugin holds. Called exactly once.
    fn dispose(&mut self) {}
}

/// Creates plugin instances. One factory is registered per qualified
/// binding type name in a module's registry.
pub trait PluginFactory: Send + Sync {
    fn create(&self) -> PluginResult<Box<dyn CompilerPlugin>>;
}

/// Factory registry exported by one plugin module.
///
/// Keys are the fully-qualified names of the binding types the module
/// declares; registration order is preserved.
#[derive(Default)]
pub struct PluginModuleRegistry {
    factories: IndexMap<String, Box<dyn PluginFactory>>,
}

impl PluginModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a qualified type name.
    pub fn register(
        &mut self,
        qualified_name: impl Into<String>,
        factory: Box<dyn PluginFactory>,
    ) -> PluginResult<()> {
        let qualified_name = qualified_name.into();

        if self.factories.contains_key(&qualified_name) {
            return Err(PluginError::new(format!(
                "plugin '{}' is already registered",
                qualified_name
            )));
        }

        self.factories.insert(qualified_name, factory);
        Ok(())
    }

    pub fn factory(&self, qualified_name: &str) -> Option<&dyn PluginFactory> {
        self.factories.get(qualified_name).map(|f| f.as_ref())
    }

    pub fn factory_names(&self) -> Vec<&str> {
        self.factories.keys().map(|n| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Export a plugin module's registry through the C-ABI entry symbol the
/// compiler resolves after loading the library.
///
/// `$register` is a `fn(&mut PluginModuleRegistry)` that registers every
/// factory the module provides. The generated symbol hands ownership of the
/// filled registry to the host.
#[macro_export]
macro_rules! export_plugin_module {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn quartz_plugin_module() -> *mut $crate::PluginModuleRegistry {
            let mut registry = $crate::PluginModuleRegistry::new();
            let register: fn(&mut $crate::PluginModuleRegistry) = $register;
            register(&mut registry);
            Box::into_raw(Box::new(registry))
        }
    };
}
