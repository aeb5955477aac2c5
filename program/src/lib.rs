//! Immutable program representation
//!
//! A [`Program`] is a snapshot of everything the compiler knows about the
//! compiling unit: its source units (keyed by path), the declarative markers
//! attached to its metadata, and the table of referenced modules with their
//! exported type definitions. Snapshots never change in place — every
//! "mutator" returns a new `Program`, and the old one stays valid and
//! inspectable for as long as anyone holds it.
//!
//! Type identity here is a (module, qualified name) pair: two modules may
//! both export a type called `acme.tools.Rewriter`, and those are different
//! types. Resolution *by name* walks the reference table in reference order
//! and takes the first match; resolution *by reference* is exact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use source_map::{SourceMap, SourceUnit};

/// Identity of a type: the module that defines it plus its fully-qualified
/// name inside that module. Equality of the whole pair is type identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub module: String,
    pub name: String,
}

impl TypeRef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.module)
    }
}

/// An exported type definition inside a referenced module.
///
/// `bases` lists the direct base class and interfaces by reference; walking
/// them transitively answers implements-queries.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub bases: Vec<TypeRef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: TypeRef) -> Self {
        self.bases.push(base);
        self
    }
}

/// A referenced module: its name, the on-disk location of its compiled
/// form, and the type definitions it exports.
#[derive(Debug, Clone)]
pub struct ModuleReference {
    pub name: String,
    pub path: PathBuf,
    pub types: Vec<TypeDef>,
}

impl ModuleReference {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, type_def: TypeDef) -> Self {
        self.types.push(type_def);
        self
    }
}

/// Ordered table of the modules a compilation references.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    modules: IndexMap<String, ModuleReference>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module reference, keyed by module name.
    pub fn insert_module(&mut self, module: ModuleReference) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn module(&self, name: &str) -> Option<&ModuleReference> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleReference> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// On-disk path of a referenced module's compiled form.
    pub fn module_path(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(|m| m.path.as_path())
    }

    /// Resolve a fully-qualified type name against the visible modules, in
    /// reference order. The first defining module wins; a name defined by
    /// several modules is not an error.
    pub fn resolve_type(&self, qualified_name: &str) -> Option<(TypeRef, &TypeDef)> {
        for module in self.modules.values() {
            for type_def in &module.types {
                if type_def.name == qualified_name {
                    return Some((TypeRef::new(module.name.clone(), qualified_name), type_def));
                }
            }
        }
        None
    }

    /// Resolve an exact type reference to its definition.
    pub fn resolve(&self, type_ref: &TypeRef) -> Option<&TypeDef> {
        self.modules
            .get(&type_ref.module)?
            .types
            .iter()
            .find(|t| t.name == type_ref.name)
    }

    /// Whether `ty` is, or transitively derives from, `capability` —
    /// compared by reference identity, never by name alone. Bases defined
    /// in modules outside the table end that branch of the walk.
    pub fn implements(&self, ty: &TypeRef, capability: &TypeRef) -> bool {
        let mut seen: HashSet<TypeRef> = HashSet::new();
        let mut work = vec![ty.clone()];

        while let Some(current) = work.pop() {
            if current == *capability {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(def) = self.resolve(&current) {
                work.extend(def.bases.iter().cloned());
            }
        }

        false
    }
}

/// A declarative marker attached to the compiling unit's metadata.
///
/// Markers are created when the metadata is read and never mutated; each
/// names a declared type by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub declared_type: TypeRef,
}

impl Marker {
    pub fn new(declared_type: TypeRef) -> Self {
        Self { declared_type }
    }
}

/// Metadata declared on the compiling unit itself.
#[derive(Debug, Clone, Default)]
pub struct UnitMetadata {
    markers: Vec<Marker>,
}

impl UnitMetadata {
    pub fn new(markers: Vec<Marker>) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }
}

/// Immutable snapshot of a compiling program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    sources: SourceMap,
    metadata: UnitMetadata,
    references: ReferenceTable,
}

impl Program {
    pub fn new(metadata: UnitMetadata, references: ReferenceTable) -> Self {
        Self {
            sources: SourceMap::new(),
            metadata,
            references,
        }
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn source_unit(&self, path: &str) -> Option<&SourceUnit> {
        self.sources.unit(path)
    }

    pub fn source_units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.sources.units()
    }

    pub fn metadata(&self) -> &UnitMetadata {
        &self.metadata
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// New snapshot with `unit` added, or replacing the unit in the same
    /// path slot. The receiver is untouched.
    pub fn with_source_unit(&self, unit: SourceUnit) -> Program {
        let mut next = self.clone();
        next.sources.insert(unit);
        next
    }

    /// New snapshot without the unit at `path` (no-op if absent).
    pub fn without_source_unit(&self, path: &str) -> Program {
        let mut next = self.clone();
        next.sources.remove(path);
        next
    }

    /// New snapshot with an additional module reference.
    pub fn with_reference(&self, module: ModuleReference) -> Program {
        let mut next = self.clone();
        next.references.insert_module(module);
        next
    }
}
