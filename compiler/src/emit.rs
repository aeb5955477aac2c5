//! Artifact emission
//!
//! The compile pass ends by writing two artifacts: the binary artifact (the
//! compiled unit table, postcard-encoded) and the symbol artifact (a JSON
//! table of unit path, stored checksum and line count that debug tooling
//! correlates positions against). Both are written to still-open streams so
//! the after-compile plugin hooks can inspect them.
//!
//! The symbol table records *stored* checksums. A unit rewritten by a
//! plugin at a pre-existing path carries its pre-rewrite checksum, so
//! debuggers keep matching positions against the text the developer sees.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use program::Program;
use quartz_plugin::ArtifactStream;

/// One compiled unit inside the binary artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub path: String,
    pub text: String,
}

/// One row of the symbol artifact's unit table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub path: String,
    /// Stored checksum, hex-encoded
    pub checksum: String,
    pub lines: usize,
}

/// Write the binary artifact for a program.
pub fn write_assembly(program: &Program, out: &mut dyn ArtifactStream) -> io::Result<()> {
    let records: Vec<UnitRecord> = program
        .source_units()
        .map(|u| UnitRecord {
            path: u.path().to_string(),
            text: u.text().to_string(),
        })
        .collect();

    let bytes = postcard::to_allocvec(&records).map_err(io::Error::other)?;
    out.write_all(&bytes)
}

/// Decode a binary artifact back into unit records.
pub fn read_assembly(bytes: &[u8]) -> io::Result<Vec<UnitRecord>> {
    postcard::from_bytes(bytes).map_err(io::Error::other)
}

/// Write the symbol artifact for a program.
pub fn write_symbols(program: &Program, out: &mut dyn ArtifactStream) -> io::Result<()> {
    let records: Vec<SymbolRecord> = program
        .source_units()
        .map(|u| SymbolRecord {
            path: u.path().to_string(),
            checksum: u.checksum().to_string(),
            lines: u.line_count(),
        })
        .collect();

    let bytes = serde_json::to_vec_pretty(&records).map_err(io::Error::other)?;
    out.write_all(&bytes)
}

/// Parse a symbol artifact from a reader positioned at its start.
pub fn read_symbols(reader: &mut dyn Read) -> io::Result<Vec<SymbolRecord>> {
    serde_json::from_reader(reader).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use program::{Program, ReferenceTable, UnitMetadata};
    use source_map::{Checksum, SourceUnit};
    use std::io::{Cursor, Seek, SeekFrom};

    fn two_unit_program() -> Program {
        Program::new(UnitMetadata::default(), ReferenceTable::new())
            .with_source_unit(SourceUnit::new("Main.qz", "class Main {}\n"))
            .with_source_unit(SourceUnit::new("Util.qz", "class Util {}\n"))
    }

    #[test]
    fn test_assembly_roundtrip() {
        let program = two_unit_program();
        let mut out = Cursor::new(Vec::new());
        write_assembly(&program, &mut out).unwrap();

        let records = read_assembly(out.get_ref()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "Main.qz");
        assert_eq!(records[0].text, "class Main {}\n");
        assert_eq!(records[1].path, "Util.qz");
    }

    #[test]
    fn test_symbols_record_stored_checksum() {
        let original = SourceUnit::new("Main.qz", "class Main {}\n");
        let pinned = original
            .with_text("class Main { /* rewritten */ }\n")
            .with_checksum(original.checksum());

        let program = Program::new(UnitMetadata::default(), ReferenceTable::new())
            .with_source_unit(pinned);

        let mut out = Cursor::new(Vec::new());
        write_symbols(&program, &mut out).unwrap();
        out.seek(SeekFrom::Start(0)).unwrap();

        let records = read_symbols(&mut out).unwrap();
        assert_eq!(records.len(), 1);
        // The stored (pre-rewrite) checksum, not the hash of the new text.
        assert_eq!(records[0].checksum, original.checksum().to_string());
        assert_ne!(
            records[0].checksum,
            Checksum::of("class Main { /* rewritten */ }\n").to_string()
        );
        assert_eq!(records[0].lines, 1);
    }
}
