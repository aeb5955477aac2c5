//! Host compile pipeline
//!
//! Thin orchestration of one compilation: run the before-compile plugin
//! hooks, emit the artifacts for the (possibly rewritten) representation,
//! run the after-compile hooks against the emitted streams, dispose the
//! plugin instances, and hand the accumulated diagnostics back to the
//! caller. Parsing, type checking and native code generation live behind
//! this boundary and are not part of this crate.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use diagnostics::{Diagnostic, DiagnosticBuilder, Diagnostics};
use program::Program;

use crate::emit;
use crate::error_codes;
use crate::plugin_loader::{DynamicModuleLoader, ModuleLoader};
use crate::plugin_pipeline::PluginPipeline;

/// Configuration for one compile run
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Emit the JSON symbol artifact alongside the binary artifact
    pub emit_symbols: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self { emit_symbols: true }
    }
}

/// Statistics collected during one compile run
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    /// Number of source units in the final representation
    pub units: usize,

    /// Number of plugin instances that ran
    pub plugins: usize,

    /// Total compile time in microseconds
    pub total_time_us: u64,
}

/// Result of one compile run
pub struct CompileOutput {
    /// Final program representation (after plugin rewrites and checksum
    /// pinning)
    pub program: Arc<Program>,

    /// Binary artifact bytes
    pub assembly: Vec<u8>,

    /// Symbol artifact bytes (empty when symbol emission is disabled)
    pub symbols: Vec<u8>,

    /// Diagnostics from both plugin phases and emission
    pub diagnostics: Diagnostics,

    pub stats: CompileStats,
}

/// Drives one compilation end to end.
pub struct CompilePipeline {
    config: CompileConfig,
    loader: Arc<dyn ModuleLoader>,
}

impl CompilePipeline {
    pub fn new(config: CompileConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { config, loader }
    }

    /// Pipeline loading plugin modules through the platform dynamic linker.
    pub fn with_dynamic_loader(config: CompileConfig) -> Self {
        Self::new(config, Arc::new(DynamicModuleLoader::new()))
    }

    pub fn compile(&self, program: Arc<Program>) -> CompileOutput {
        let started = Instant::now();
        let mut diagnostics = Diagnostics::new();
        let mut plugins = PluginPipeline::new(Arc::clone(&self.loader));

        info!("running before-compile plugins");
        let (program, before) = plugins.run_before_compile(program);
        diagnostics.extend(before);

        debug!("emitting artifacts for {} unit(s)", program.sources().len());
        let mut assembly = Cursor::new(Vec::new());
        let mut symbols = Cursor::new(Vec::new());

        let mut emitted = true;
        if let Err(e) = emit::write_assembly(&program, &mut assembly) {
            diagnostics.push(emission_diagnostic(&format!("binary artifact: {}", e)));
            emitted = false;
        } else if self.config.emit_symbols {
            if let Err(e) = emit::write_symbols(&program, &mut symbols) {
                diagnostics.push(emission_diagnostic(&format!("symbol artifact: {}", e)));
                emitted = false;
            }
        }

        // The after-compile point requires fully written artifacts; without
        // them there is nothing for the hooks to observe.
        if emitted {
            info!("running after-compile plugins");
            let after = plugins.run_after_compile(&program, &mut assembly, &mut symbols);
            diagnostics.extend(after);
        }

        let stats = CompileStats {
            units: program.sources().len(),
            plugins: plugins.plugin_count(),
            total_time_us: started.elapsed().as_micros() as u64,
        };

        plugins.dispose();

        CompileOutput {
            program,
            assembly: assembly.into_inner(),
            symbols: symbols.into_inner(),
            diagnostics,
            stats,
        }
    }
}

fn emission_diagnostic(detail: &str) -> Diagnostic {
    DiagnosticBuilder::error(format!("failed to emit artifacts: {}", detail))
        .code(error_codes::ARTIFACT_EMISSION_FAILED.format_code())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_loader::StaticModuleLoader;
    use program::{Marker, ModuleReference, ReferenceTable, TypeDef, TypeRef, UnitMetadata};
    use quartz_plugin::{
        binding_capability, framework_reference, BeforeCompileContext, CompilerPlugin,
        PluginFactory, PluginModuleRegistry, PluginResult,
    };
    use source_map::{Checksum, SourceUnit};

    const MODULE: &str = "acme.generators";
    const MODULE_PATH: &str = "plugins/libacme_generators.so";
    const PLUGIN_TYPE: &str = "acme.generators.HeaderPlugin";

    /// Prepends a header comment to every source unit.
    struct HeaderPlugin;

    impl CompilerPlugin for HeaderPlugin {
        fn name(&self) -> &str {
            "HeaderPlugin"
        }

        fn before_compile(
            &mut self,
            ctx: BeforeCompileContext<'_>,
        ) -> PluginResult<Option<Arc<Program>>> {
            let mut program = (**ctx.program()).clone();
            let rewritten: Vec<SourceUnit> = program
                .source_units()
                .map(|u| u.with_text(format!("// generated header\n{}", u.text())))
                .collect();
            for unit in rewritten {
                program = program.with_source_unit(unit);
            }
            Ok(Some(Arc::new(program)))
        }
    }

    struct HeaderFactory;

    impl PluginFactory for HeaderFactory {
        fn create(&self) -> PluginResult<Box<dyn CompilerPlugin>> {
            Ok(Box::new(HeaderPlugin))
        }
    }

    fn program_with_plugin() -> Arc<Program> {
        let mut references = ReferenceTable::new();
        references.insert_module(framework_reference());
        references.insert_module(
            ModuleReference::new(MODULE, MODULE_PATH)
                .with_type(TypeDef::new(PLUGIN_TYPE).with_base(binding_capability())),
        );

        Arc::new(
            Program::new(
                UnitMetadata::new(vec![Marker::new(TypeRef::new(MODULE, PLUGIN_TYPE))]),
                references,
            )
            .with_source_unit(SourceUnit::new("Main.qz", "class Main {}\n")),
        )
    }

    fn loader_with_plugin() -> Arc<StaticModuleLoader> {
        let mut registry = PluginModuleRegistry::new();
        registry
            .register(PLUGIN_TYPE, Box::new(HeaderFactory))
            .unwrap();
        let mut loader = StaticModuleLoader::new();
        loader.register_module(MODULE_PATH, registry);
        Arc::new(loader)
    }

    #[test]
    fn test_compile_without_plugins() {
        let program = Arc::new(
            Program::new(UnitMetadata::default(), ReferenceTable::new())
                .with_source_unit(SourceUnit::new("Main.qz", "class Main {}\n")),
        );

        let pipeline =
            CompilePipeline::new(CompileConfig::default(), Arc::new(StaticModuleLoader::new()));
        let output = pipeline.compile(program);

        assert!(output.diagnostics.is_empty());
        assert_eq!(output.stats.units, 1);
        assert_eq!(output.stats.plugins, 0);

        let records = emit::read_assembly(&output.assembly).unwrap();
        assert_eq!(records[0].text, "class Main {}\n");

        let symbols = emit::read_symbols(&mut output.symbols.as_slice()).unwrap();
        assert_eq!(symbols[0].path, "Main.qz");
    }

    #[test]
    fn test_compile_with_rewriting_plugin() {
        let program = program_with_plugin();
        let original_checksum = program.source_unit("Main.qz").unwrap().checksum();

        let pipeline = CompilePipeline::new(CompileConfig::default(), loader_with_plugin());
        let output = pipeline.compile(program);

        assert!(output.diagnostics.is_empty());
        assert_eq!(output.stats.plugins, 1);

        // The binary artifact carries the rewritten text.
        let records = emit::read_assembly(&output.assembly).unwrap();
        assert_eq!(records[0].text, "// generated header\nclass Main {}\n");

        // The symbol artifact still carries the original checksum, so debug
        // positions resolve against the text the developer wrote.
        let symbols = emit::read_symbols(&mut output.symbols.as_slice()).unwrap();
        assert_eq!(symbols[0].checksum, original_checksum.to_string());
        assert_ne!(
            symbols[0].checksum,
            Checksum::of("// generated header\nclass Main {}\n").to_string()
        );
    }

    #[test]
    fn test_symbol_emission_can_be_disabled() {
        let program = program_with_plugin();
        let config = CompileConfig { emit_symbols: false };
        let pipeline = CompilePipeline::new(config, loader_with_plugin());
        let output = pipeline.compile(program);

        assert!(output.diagnostics.is_empty());
        assert!(output.symbols.is_empty());
        assert!(!output.assembly.is_empty());
    }
}
