//! Build-time plugin execution pipeline
//!
//! One [`PluginPipeline`] lives for exactly one compilation. It finds the
//! plugin bindings declared on the compiling unit, loads and instantiates
//! their implementations through the injected [`ModuleLoader`] capability,
//! and drives the two extension points around the main compile pass:
//!
//! ```text
//! ┌────────────────┐   run_before_compile    ┌────────────────┐
//! │ host compiler  │ ──────────────────────▶ │ PluginPipeline │
//! │                │ ◀── (program', diags) ── │  discovery     │
//! │  compile +     │                         │  instantiation │
//! │  emit          │   run_after_compile     │  ordered hooks │
//! │                │ ──────────────────────▶ │  checksum pin  │
//! │                │ ◀────── diags ───────── │  disposal      │
//! └────────────────┘                         └────────────────┘
//! ```
//!
//! Failure policy is fail-fast, not fail-isolated: the first factory that
//! errors abandons all remaining instantiation work and skips the whole
//! before-compile phase; the first hook that errors ends its phase. Plugins
//! may depend on the effects of the plugins ordered before them, so running
//! the survivors after a failure would compound the damage. Each failure
//! is reported as one diagnostic with the fixed `E7401` identity.
//!
//! After the before-compile hooks run, every source unit whose path already
//! existed gets its stored checksum pinned back to the pre-hook value, even
//! if a plugin rewrote its text. Debug tables are written from stored
//! checksums, so positions in rewritten-but-path-stable units keep
//! resolving against the text the developer actually sees.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use diagnostics::{Diagnostic, DiagnosticBuilder, Diagnostics};
use program::{Program, TypeRef};
use quartz_plugin::{
    framework_reference, AfterCompileContext, ArtifactStream, BeforeCompileContext,
    CompilerPlugin, PluginError, PLUGIN_BINDING_TYPE,
};
use source_map::Checksum;

use crate::error_codes;
use crate::plugin_loader::{LoadedModule, ModuleLoader};

/// A plugin binding discovered on the compiling unit: the marker's declared
/// type together with the module reference that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginBinding {
    type_ref: TypeRef,
}

impl PluginBinding {
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Fully-qualified name of the binding's declared type.
    pub fn qualified_name(&self) -> &str {
        &self.type_ref.name
    }

    /// Name of the referenced module that declares the binding's type.
    pub fn module_name(&self) -> &str {
        &self.type_ref.module
    }
}

/// Find the plugin bindings declared on the compiling unit.
///
/// The binding capability type is resolved against the program's visible
/// reference table. A compiling unit that uses plugins normally references
/// the plugin framework itself; when it does not, resolution is retried
/// against a derived representation that adds the framework's own module
/// reference — only for discovery, the original program is untouched. If
/// the capability still does not resolve, the unit has no plugins and an
/// empty list is returned; that is not an error.
///
/// A marker counts as a binding iff its declared type transitively derives
/// from the capability type, compared by reference identity (module plus
/// name), never by name alone.
pub fn discover_plugin_bindings(program: &Program) -> Vec<PluginBinding> {
    let derived;
    let (references, capability) = match program.references().resolve_type(PLUGIN_BINDING_TYPE) {
        Some((capability, _)) => (program.references(), capability),
        None => {
            derived = program.with_reference(framework_reference());
            match derived.references().resolve_type(PLUGIN_BINDING_TYPE) {
                Some((capability, _)) => (derived.references(), capability),
                None => return Vec::new(),
            }
        }
    };

    let mut bindings = Vec::new();
    for marker in program.metadata().markers() {
        if references.implements(&marker.declared_type, &capability) {
            debug!("discovered plugin binding {}", marker.declared_type);
            bindings.push(PluginBinding {
                type_ref: marker.declared_type.clone(),
            });
        }
    }

    bindings
}

/// One instantiated plugin, paired with the module that must stay loaded
/// for as long as the instance's code is reachable.
struct PluginEntry {
    binding_name: String,
    plugin: Box<dyn CompilerPlugin>,
    _module: Arc<dyn LoadedModule>,
}

/// Executes the plugin extension points for one compilation.
///
/// The host constructs one executor per compilation, calls
/// [`run_before_compile`](PluginPipeline::run_before_compile) once with the
/// initial representation, later calls
/// [`run_after_compile`](PluginPipeline::run_after_compile) once with the
/// final representation and the emitted artifact streams, and disposes the
/// executor at the end. Everything runs inline on the caller's thread, in
/// discovery order.
pub struct PluginPipeline {
    loader: Arc<dyn ModuleLoader>,
    plugins: Vec<PluginEntry>,
    discovered: bool,
    instantiation_failed: bool,
    diagnostics: Diagnostics,
}

impl PluginPipeline {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            plugins: Vec::new(),
            discovered: false,
            instantiation_failed: false,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Number of successfully instantiated plugin instances.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Run the before-compile extension point.
    ///
    /// Returns the representation the compile pass should consume, plus the
    /// diagnostics this phase produced. With no bindings, or after an
    /// instantiation failure, the input representation is returned as-is.
    pub fn run_before_compile(&mut self, program: Arc<Program>) -> (Arc<Program>, Diagnostics) {
        self.diagnostics.clear();

        // Discovery and instantiation happen once per executor; the set of
        // instances is fixed from then on.
        if !self.discovered {
            self.discovered = true;
            let bindings = discover_plugin_bindings(&program);
            if bindings.is_empty() {
                debug!("no plugin bindings declared on the compiling unit");
                return (program, self.diagnostics.clone());
            }
            info!("discovered {} plugin binding(s)", bindings.len());
            self.instantiate(&program, &bindings);
        }

        if self.instantiation_failed || self.plugins.is_empty() {
            return (program, self.diagnostics.clone());
        }

        // Checksums as they were before any hook ran, keyed by path.
        let original: IndexMap<String, Checksum> = program
            .source_units()
            .map(|u| (u.path().to_string(), u.checksum()))
            .collect();

        let mut current = program;
        for entry in &mut self.plugins {
            debug!("running before-compile hook of {}", entry.binding_name);
            let ctx = BeforeCompileContext::new(Arc::clone(&current), &mut self.diagnostics);
            match entry.plugin.before_compile(ctx) {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        "before-compile hook of {} failed: {}",
                        entry.plugin.name(),
                        err
                    );
                    let diag = plugin_exception_diagnostic(entry.plugin.name(), &err);
                    self.diagnostics.push(diag);
                    break;
                }
            }
        }

        let result = restore_checksums(&current, &original);
        (result, self.diagnostics.clone())
    }

    /// Run the after-compile extension point.
    ///
    /// The representation is final; the artifact streams are fully written,
    /// still open, at an arbitrary position. Skipped entirely when this
    /// executor never instantiated any plugin instance.
    pub fn run_after_compile(
        &mut self,
        program: &Arc<Program>,
        assembly: &mut dyn ArtifactStream,
        symbols: &mut dyn ArtifactStream,
    ) -> Diagnostics {
        self.diagnostics.clear();

        if self.plugins.is_empty() {
            return self.diagnostics.clone();
        }

        for entry in &mut self.plugins {
            debug!("running after-compile hook of {}", entry.binding_name);
            let ctx = AfterCompileContext::new(
                program,
                &mut self.diagnostics,
                &mut *assembly,
                &mut *symbols,
            );
            match entry.plugin.after_compile(ctx) {
                Ok(()) => {}
                Err(err) => {
                    warn!(
                        "after-compile hook of {} failed: {}",
                        entry.plugin.name(),
                        err
                    );
                    let diag = plugin_exception_diagnostic(entry.plugin.name(), &err);
                    self.diagnostics.push(diag);
                    break;
                }
            }
        }

        self.diagnostics.clone()
    }

    /// Dispose every instantiated plugin, in discovery order. Idempotent;
    /// also invoked from `Drop` so disposal runs on every exit path.
    pub fn dispose(&mut self) {
        for mut entry in self.plugins.drain(..) {
            debug!("disposing plugin {}", entry.binding_name);
            entry.plugin.dispose();
        }
    }

    /// Turn discovered bindings into live instances, in discovery order.
    /// The first failure records one diagnostic and abandons the rest;
    /// instances created before the failure are kept.
    fn instantiate(&mut self, program: &Program, bindings: &[PluginBinding]) {
        let mut loaded: IndexMap<PathBuf, Arc<dyn LoadedModule>> = IndexMap::new();

        for binding in bindings {
            match self.instantiate_one(program, binding, &mut loaded) {
                Ok(entry) => {
                    info!("instantiated plugin {}", entry.binding_name);
                    self.plugins.push(entry);
                }
                Err(err) => {
                    warn!(
                        "failed to instantiate plugin {}: {}",
                        binding.qualified_name(),
                        err
                    );
                    let diag = plugin_exception_diagnostic(binding.qualified_name(), &err);
                    self.diagnostics.push(diag);
                    self.instantiation_failed = true;
                    return;
                }
            }
        }
    }

    fn instantiate_one(
        &self,
        program: &Program,
        binding: &PluginBinding,
        loaded: &mut IndexMap<PathBuf, Arc<dyn LoadedModule>>,
    ) -> Result<PluginEntry, PluginError> {
        let module_name = binding.module_name();
        let path = program
            .references()
            .module_path(module_name)
            .ok_or_else(|| {
                PluginError::new(format!(
                    "module '{}' is not referenced by the compiling unit",
                    module_name
                ))
            })?
            .to_path_buf();

        let module = match loaded.get(&path) {
            Some(module) => Arc::clone(module),
            None => {
                let module = self
                    .loader
                    .load(&path)
                    .map_err(|e| PluginError::new(e.to_string()))?;
                loaded.insert(path, Arc::clone(&module));
                module
            }
        };

        let factory = module.factory(binding.qualified_name()).ok_or_else(|| {
            PluginError::new(format!(
                "factory '{}' not found in module '{}'",
                binding.qualified_name(),
                module_name
            ))
        })?;

        let plugin = factory.create()?;

        Ok(PluginEntry {
            binding_name: binding.qualified_name().to_string(),
            plugin,
            _module: module,
        })
    }
}

impl Drop for PluginPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Pin the stored checksum of every path that existed before the hooks ran
/// back to its pre-hook value. Paths a plugin introduced keep their natural
/// checksum; paths a plugin removed are simply absent.
fn restore_checksums(
    program: &Arc<Program>,
    original: &IndexMap<String, Checksum>,
) -> Arc<Program> {
    let mut patched: Option<Program> = None;

    for unit in program.source_units() {
        if let Some(&checksum) = original.get(unit.path()) {
            if unit.checksum() != checksum {
                let pinned = unit.clone().with_checksum(checksum);
                let base = patched.take().unwrap_or_else(|| (**program).clone());
                patched = Some(base.with_source_unit(pinned));
            }
        }
    }

    match patched {
        Some(p) => Arc::new(p),
        None => Arc::clone(program),
    }
}

fn plugin_exception_diagnostic(name: &str, error: &PluginError) -> Diagnostic {
    DiagnosticBuilder::error(format!(
        "Plugin exception thrown from {}. Full exception: {}",
        name, error
    ))
    .code(error_codes::PLUGIN_EXECUTION_EXCEPTION.format_code())
    .build()
}
