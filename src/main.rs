//! Quartz - compiler toolchain with a build-time plugin pipeline
//!
//! # Usage
//!
//! ```bash
//! # Build a project, running its declared plugins
//! quartz build quartz.toml
//!
//! # List the plugin bindings a project declares without building
//! quartz check quartz.toml
//!
//! # Show information about the toolchain
//! quartz info
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use compiler::pipeline::{CompileConfig, CompilePipeline};
use compiler::plugin_pipeline::discover_plugin_bindings;
use diagnostics::ErrorFormatter;

#[derive(Parser)]
#[command(name = "quartz")]
#[command(version = "0.1.0")]
#[command(about = "Quartz - compiler toolchain with a build-time plugin pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a project from its quartz.toml manifest
    Build {
        /// Path to the quartz.toml manifest
        manifest: PathBuf,

        /// Output directory (defaults to the project root)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show compile statistics
        #[arg(long)]
        stats: bool,

        /// Skip the symbol artifact
        #[arg(long)]
        no_symbols: bool,
    },

    /// Parse a manifest and list its discovered plugin bindings
    Check {
        /// Path to the quartz.toml manifest
        manifest: PathBuf,
    },

    /// Show information about the toolchain
    Info,
}

fn main() {
    compiler::logging::init_from_env();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { manifest, output, stats, no_symbols } => {
            build(manifest, output, stats, no_symbols)
        }
        Commands::Check { manifest } => check(manifest),
        Commands::Info => {
            show_info();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_manifest(path: &Path) -> Result<(compiler::manifest::QuartzManifest, PathBuf), String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let manifest = compiler::manifest::parse_manifest(&content)?;
    let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    Ok((manifest, root))
}

fn build(
    manifest_path: PathBuf,
    output: Option<PathBuf>,
    stats: bool,
    no_symbols: bool,
) -> Result<(), String> {
    let (manifest, root) = load_manifest(&manifest_path)?;
    let program = manifest.to_program(&root)?;

    println!(
        "🔨 Building {} ({} unit(s), {} reference(s))...",
        manifest.project.name,
        program.sources().len(),
        program.references().len()
    );

    let config = CompileConfig { emit_symbols: !no_symbols };
    let pipeline = CompilePipeline::with_dynamic_loader(config);
    let out = pipeline.compile(Arc::new(program));

    if !out.diagnostics.is_empty() {
        let formatter = ErrorFormatter::with_colors();
        print!(
            "{}",
            formatter.format_diagnostics(&out.diagnostics, out.program.sources())
        );
        println!();
    }

    let out_dir = output.unwrap_or_else(|| root.clone());
    fs::create_dir_all(&out_dir)
        .map_err(|e| format!("Failed to create {}: {}", out_dir.display(), e))?;

    let assembly_path = out_dir.join(format!("{}.qza", manifest.project.name));
    fs::write(&assembly_path, &out.assembly)
        .map_err(|e| format!("Failed to write {}: {}", assembly_path.display(), e))?;
    println!("  Binary artifact: {}", assembly_path.display());

    if !out.symbols.is_empty() {
        let symbols_path = out_dir.join(format!("{}.qzsym", manifest.project.name));
        fs::write(&symbols_path, &out.symbols)
            .map_err(|e| format!("Failed to write {}: {}", symbols_path.display(), e))?;
        println!("  Symbol artifact: {}", symbols_path.display());
    }

    if stats {
        println!("\nStatistics:");
        println!("  Units:    {}", out.stats.units);
        println!("  Plugins:  {}", out.stats.plugins);
        println!("  Time:     {} us", out.stats.total_time_us);
    }

    if out.diagnostics.has_errors() {
        Err(format!(
            "build finished with {} error(s)",
            out.diagnostics.errors().count()
        ))
    } else {
        let warnings = out.diagnostics.warnings().count();
        if warnings > 0 {
            println!("\n✓ Build complete ({} warning(s))", warnings);
        } else {
            println!("\n✓ Build complete");
        }
        Ok(())
    }
}

fn check(manifest_path: PathBuf) -> Result<(), String> {
    let (manifest, root) = load_manifest(&manifest_path)?;
    let program = manifest.to_program(&root)?;

    println!("✓ Manifest OK: {}", manifest.project.name);

    for module in program.references().modules() {
        if !module.path.exists() {
            println!(
                "  warning[{}]: module '{}' not found at {}",
                compiler::error_codes::PLUGIN_MODULE_LOAD_FAILED.format_code(),
                module.name,
                module.path.display()
            );
        }
    }

    let bindings = discover_plugin_bindings(&program);
    if bindings.is_empty() {
        println!("  No plugin bindings declared.");
    } else {
        println!("  Plugin bindings ({}):", bindings.len());
        for binding in &bindings {
            println!("    {} [{}]", binding.qualified_name(), binding.module_name());
        }
    }

    Ok(())
}

fn show_info() {
    println!("Quartz Compiler v0.1.0");
    println!("Compiler toolchain with a build-time plugin pipeline\n");

    println!("Features:");
    println!("  ✓ Declarative plugin bindings on the compiling unit");
    println!("  ✓ Dynamic plugin modules (export_plugin_module!)");
    println!("  ✓ Source rewriting before the compile pass");
    println!("  ✓ Artifact inspection after the compile pass");
    println!("  ✓ Checksum-stable debug identity for rewritten units");
}
