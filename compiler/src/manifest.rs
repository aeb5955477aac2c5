//! TOML manifest parsing for `quartz.toml`.
//!
//! The manifest is the host-side boundary that produces the initial program
//! representation: which source files the unit compiles, which compiled
//! modules it references, and which declarative markers it carries.
//! Referenced modules are binary libraries the compiler cannot parse, so
//! the manifest declares their exported types and base types explicitly.
//!
//! # Example
//!
//! ```toml
//! [project]
//! name = "demo"
//! version = "0.1.0"
//!
//! [[sources]]
//! path = "src/Main.qz"
//!
//! [[references]]
//! name = "acme.generators"
//! path = "plugins/libacme_generators.so"
//!
//! [[references.types]]
//! name = "acme.generators.HeaderPlugin"
//! bases = [{ module = "quartz.plugin", name = "quartz.plugin.PluginBinding" }]
//!
//! [[markers]]
//! module = "acme.generators"
//! type = "acme.generators.HeaderPlugin"
//! ```

use serde::Deserialize;
use std::path::Path;

use program::{Marker, ModuleReference, Program, ReferenceTable, TypeDef, TypeRef, UnitMetadata};
use source_map::SourceUnit;

/// Parsed `quartz.toml`
#[derive(Debug, Deserialize)]
pub struct QuartzManifest {
    pub project: ProjectSection,

    #[serde(default)]
    pub sources: Vec<SourceEntry>,

    #[serde(default)]
    pub references: Vec<ReferenceEntry>,

    #[serde(default)]
    pub markers: Vec<MarkerEntry>,
}

/// `[project]` section
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    pub version: Option<String>,
}

/// One `[[sources]]` entry, relative to the manifest directory
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub path: String,
}

/// One `[[references]]` entry: a compiled module and its declared exports
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceEntry {
    pub name: String,
    pub path: String,

    #[serde(default)]
    pub types: Vec<TypeEntry>,
}

/// An exported type declared by a reference
#[derive(Debug, Clone, Deserialize)]
pub struct TypeEntry {
    pub name: String,

    #[serde(default)]
    pub bases: Vec<BaseEntry>,
}

/// A base type, named by module and qualified name
#[derive(Debug, Clone, Deserialize)]
pub struct BaseEntry {
    pub module: String,
    pub name: String,
}

/// One `[[markers]]` entry on the compiling unit
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerEntry {
    pub module: String,

    #[serde(rename = "type")]
    pub type_name: String,
}

/// Parse a `quartz.toml` string.
pub fn parse_manifest(content: &str) -> Result<QuartzManifest, String> {
    toml::from_str(content).map_err(|e| format!("Failed to parse quartz.toml: {}", e))
}

impl QuartzManifest {
    /// Reference table with module paths resolved against the project root.
    pub fn reference_table(&self, root: &Path) -> ReferenceTable {
        let mut table = ReferenceTable::new();

        for reference in &self.references {
            let mut module = ModuleReference::new(&reference.name, root.join(&reference.path));
            for type_entry in &reference.types {
                let mut type_def = TypeDef::new(&type_entry.name);
                for base in &type_entry.bases {
                    type_def = type_def.with_base(TypeRef::new(&base.module, &base.name));
                }
                module = module.with_type(type_def);
            }
            table.insert_module(module);
        }

        table
    }

    /// Unit metadata carrying the declared markers, in declaration order.
    pub fn metadata(&self) -> UnitMetadata {
        UnitMetadata::new(
            self.markers
                .iter()
                .map(|m| Marker::new(TypeRef::new(&m.module, &m.type_name)))
                .collect(),
        )
    }

    /// Build the initial program representation, reading each source file
    /// relative to the project root.
    pub fn to_program(&self, root: &Path) -> Result<Program, String> {
        let mut program = Program::new(self.metadata(), self.reference_table(root));

        for source in &self.sources {
            let path = root.join(&source.path);
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            program = program.with_source_unit(SourceUnit::new(source.path.clone(), text));
        }

        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[project]
name = "demo"
version = "0.1.0"

[[sources]]
path = "src/Main.qz"

[[references]]
name = "acme.generators"
path = "plugins/libacme_generators.so"

[[references.types]]
name = "acme.generators.HeaderPlugin"
bases = [{ module = "quartz.plugin", name = "quartz.plugin.PluginBinding" }]

[[markers]]
module = "acme.generators"
type = "acme.generators.HeaderPlugin"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = parse_manifest(SAMPLE).unwrap();

        assert_eq!(manifest.project.name, "demo");
        assert_eq!(manifest.project.version.as_deref(), Some("0.1.0"));
        assert_eq!(manifest.sources.len(), 1);
        assert_eq!(manifest.references.len(), 1);
        assert_eq!(manifest.markers.len(), 1);
        assert_eq!(manifest.markers[0].type_name, "acme.generators.HeaderPlugin");
    }

    #[test]
    fn test_reference_table_resolves_paths_against_root() {
        let manifest = parse_manifest(SAMPLE).unwrap();
        let table = manifest.reference_table(Path::new("/work/demo"));

        let path = table.module_path("acme.generators").unwrap();
        assert_eq!(
            path,
            Path::new("/work/demo/plugins/libacme_generators.so")
        );

        let (type_ref, type_def) = table.resolve_type("acme.generators.HeaderPlugin").unwrap();
        assert_eq!(type_ref.module, "acme.generators");
        assert_eq!(type_def.bases.len(), 1);
        assert_eq!(type_def.bases[0].module, "quartz.plugin");
    }

    #[test]
    fn test_metadata_preserves_marker_order() {
        let toml = r#"
[project]
name = "demo"

[[markers]]
module = "a"
type = "a.First"

[[markers]]
module = "b"
type = "b.Second"
"#;
        let manifest = parse_manifest(toml).unwrap();
        let metadata = manifest.metadata();

        let names: Vec<_> = metadata
            .markers()
            .iter()
            .map(|m| m.declared_type.name.as_str())
            .collect();
        assert_eq!(names, vec!["a.First", "b.Second"]);
    }

    #[test]
    fn test_missing_project_section_is_an_error() {
        let err = parse_manifest("[[sources]]\npath = \"x.qz\"\n").unwrap_err();
        assert!(err.contains("quartz.toml"));
    }

    #[test]
    fn test_to_program_reports_missing_sources() {
        let manifest = parse_manifest(SAMPLE).unwrap();
        let err = manifest
            .to_program(Path::new("/nonexistent/project"))
            .unwrap_err();
        assert!(err.contains("Main.qz"));
    }
}
