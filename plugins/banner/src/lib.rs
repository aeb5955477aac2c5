//! Banner plugin - the reference quartz plugin module
//!
//! Before the compile pass, prepends a banner comment to every source unit
//! that does not already carry one. After the compile pass, sanity-checks
//! that the binary artifact is non-empty. Ships as a cdylib; the host
//! resolves the registry through the symbol that [`export_plugin_module!`]
//! exports.
//!
//! A project enables it by referencing the compiled module and declaring
//! the marker:
//!
//! ```toml
//! [[references]]
//! name = "quartz.banner"
//! path = "libquartz_banner_plugin.so"
//!
//! [[references.types]]
//! name = "quartz.banner.BannerPlugin"
//! bases = [{ module = "quartz.plugin", name = "quartz.plugin.PluginBinding" }]
//!
//! [[markers]]
//! module = "quartz.banner"
//! type = "quartz.banner.BannerPlugin"
//! ```

use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use program::Program;
use quartz_plugin::{
    export_plugin_module, AfterCompileContext, BeforeCompileContext, CompilerPlugin,
    PluginError, PluginFactory, PluginModuleRegistry, PluginResult,
};

const BANNER: &str = "// compiled with quartz\n";

pub struct BannerPlugin;

impl CompilerPlugin for BannerPlugin {
    fn name(&self) -> &str {
        "BannerPlugin"
    }

    fn before_compile(
        &mut self,
        ctx: BeforeCompileContext<'_>,
    ) -> PluginResult<Option<Arc<Program>>> {
        let program = ctx.program();

        let stamped: Vec<_> = program
            .source_units()
            .filter(|u| !u.text().starts_with(BANNER))
            .map(|u| u.with_text(format!("{}{}", BANNER, u.text())))
            .collect();

        if stamped.is_empty() {
            return Ok(None);
        }

        let mut next = (**program).clone();
        for unit in stamped {
            next = next.with_source_unit(unit);
        }
        Ok(Some(Arc::new(next)))
    }

    fn after_compile(&mut self, ctx: AfterCompileContext<'_>) -> PluginResult<()> {
        let assembly_len = ctx.assembly.seek(SeekFrom::End(0))?;
        if assembly_len == 0 {
            return Err(PluginError::new("binary artifact is empty"));
        }
        Ok(())
    }
}

pub struct BannerFactory;

impl PluginFactory for BannerFactory {
    fn create(&self) -> PluginResult<Box<dyn CompilerPlugin>> {
        Ok(Box::new(BannerPlugin))
    }
}

fn register(registry: &mut PluginModuleRegistry) {
    registry
        .register("quartz.banner.BannerPlugin", Box::new(BannerFactory))
        .expect("banner factory registers once");
}

export_plugin_module!(register);

#[cfg(test)]
mod tests {
    use super::*;
    use diagnostics::Diagnostics;
    use program::{ReferenceTable, UnitMetadata};
    use source_map::SourceUnit;
    use std::io::Cursor;

    #[test]
    fn test_banner_is_prepended_once() {
        let program = Arc::new(
            Program::new(UnitMetadata::default(), ReferenceTable::new())
                .with_source_unit(SourceUnit::new("Main.qz", "class Main {}\n")),
        );

        let mut plugin = BannerPlugin;
        let mut diagnostics = Diagnostics::new();

        let first = plugin
            .before_compile(BeforeCompileContext::new(program, &mut diagnostics))
            .unwrap()
            .expect("units were stamped");
        assert_eq!(
            first.source_unit("Main.qz").unwrap().text(),
            "// compiled with quartz\nclass Main {}\n"
        );

        // Already-stamped units are left alone.
        let second = plugin
            .before_compile(BeforeCompileContext::new(
                Arc::clone(&first),
                &mut diagnostics,
            ))
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_after_hook_rejects_empty_assembly() {
        let program = Arc::new(Program::default());
        let mut plugin = BannerPlugin;
        let mut diagnostics = Diagnostics::new();
        let mut assembly = Cursor::new(Vec::new());
        let mut symbols = Cursor::new(Vec::new());

        let err = plugin
            .after_compile(AfterCompileContext::new(
                &program,
                &mut diagnostics,
                &mut assembly,
                &mut symbols,
            ))
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_after_hook_accepts_written_assembly() {
        let program = Arc::new(Program::default());
        let mut plugin = BannerPlugin;
        let mut diagnostics = Diagnostics::new();
        let mut assembly = Cursor::new(b"artifact".to_vec());
        let mut symbols = Cursor::new(Vec::new());

        plugin
            .after_compile(AfterCompileContext::new(
                &program,
                &mut diagnostics,
                &mut assembly,
                &mut symbols,
            ))
            .unwrap();
    }
}
