//! A parser for the EDIF 2.0.0 netlist subset written by Vivado.
//!
//! The parser produces a plain record tree, [EdifFile], in which
//! every cross reference (instance to cell, port-ref to port and
//! instance) is still a legal-name key. Resolving these keys into
//! a linked netlist graph is left to the consumer.
//!
//! # Usage
//!
//! Pass a `&str` to [EdifFile::parse_str], or a path to
//! [EdifFile::parse_file]. Large files can be parsed with
//! [EdifFile::parse_file_parallel].
//! ```
//! use edifparse::EdifFile;
//!
//! let parsed = EdifFile::parse_str(r#"
//! (edif top (edifversion 2 0 0) (edifLevel 0) (keywordmap (keywordlevel 0))
//!   (library work (edifLevel 0) (technology (numberDefinition))
//!     (cell top (celltype GENERIC)
//!       (view netlist (viewtype NETLIST)
//!         (interface (port a (direction INPUT))))))
//!   (design top (cellref top (libraryref work))))
//! "#).expect("parse error");
//! assert_eq!(parsed.libraries[0].cells[0].ports.len(), 1);
//! ```

use std::fs::File;
use std::io::{ BufReader, BufRead };
use std::path::Path;
use std::sync::Arc;

mod error;
pub use error::{ EdifParseError, Result };

mod config;
pub use config::{ ParserConfig, DEFAULT_MAX_TOKEN_LENGTH, THREADS_ENV };

mod pool;
pub use pool::{ StringPool, Ident };

pub mod tokenizer;
pub use tokenizer::{ Token, TokenSource, EdifTokenizer };

pub mod ring;
pub use ring::{ RingTokenizer, BoundaryGuess };

mod property;
pub use property::{ PropertyKind, PropertyValue, parse_verilog_int };

pub mod legal;

mod parser;
pub use parser::EdifParser;

mod parallel;
pub use parallel::ParallelStats;

/// A name as it appears in the file: either a bare legal
/// identifier, or `(rename legal "original")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameObj {
    /// The display (original) name.
    pub name: Ident,
    /// The legal identifier, if it differs from `name`.
    pub rename: Option<Ident>,
}

impl NameObj {
    pub fn new(name: Ident) -> NameObj {
        NameObj { name, rename: None }
    }

    pub fn renamed(name: Ident, rename: Ident) -> NameObj {
        NameObj { name, rename: Some(rename) }
    }

    /// The name used to refer to this object inside the file.
    #[inline]
    pub fn legal_name(&self) -> &Ident {
        self.rename.as_ref().unwrap_or(&self.name)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PortDirection {
    Input,
    Output,
    InOut,
}

impl PortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            PortDirection::Input => "INPUT",
            PortDirection::Output => "OUTPUT",
            PortDirection::InOut => "INOUT",
        }
    }

    pub fn from_keyword(s: &str) -> Option<PortDirection> {
        if s.eq_ignore_ascii_case("INPUT") { Some(PortDirection::Input) }
        else if s.eq_ignore_ascii_case("OUTPUT") { Some(PortDirection::Output) }
        else if s.eq_ignore_ascii_case("INOUT") { Some(PortDirection::InOut) }
        else { None }
    }
}

/// `(property name (type value) [(owner "x")])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRec {
    pub name: NameObj,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRec {
    pub name: NameObj,
    /// 1 for scalar ports, the array width for buses.
    pub width: u32,
    pub direction: PortDirection,
    pub properties: Vec<PropertyRec>,
}

/// Reference to a cell by legal name. A missing library means
/// the library containing the reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRefRec {
    pub cell: Ident,
    pub library: Option<Ident>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRec {
    pub name: NameObj,
    pub view: NameObj,
    pub cell_ref: CellRefRec,
    pub properties: Vec<PropertyRec>,
    /// byte offset just past the instance name.
    pub offset: u64,
}

/// `(portref name [(instanceref inst)])` or
/// `(portref (member name idx) [(instanceref inst)])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRefRec {
    /// Legal name of the port (bus ports use the bare bus name).
    pub port: Ident,
    pub member: Option<u32>,
    /// Legal name of the instance. `None` is a pin on the
    /// boundary of the enclosing cell.
    pub instance: Option<Ident>,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetRec {
    pub name: NameObj,
    pub joined: Vec<PortRefRec>,
    pub properties: Vec<PropertyRec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRec {
    pub name: NameObj,
    pub view: NameObj,
    pub ports: Vec<PortRec>,
    pub instances: Vec<InstanceRec>,
    pub nets: Vec<NetRec>,
    pub properties: Vec<PropertyRec>,
    /// byte offset just past the cell name token.
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRec {
    pub name: NameObj,
    /// Declared with `(external ...)` instead of `(library ...)`.
    pub external: bool,
    pub cells: Vec<CellRec>,
    pub offset: u64,
}

/// The `(status ...)` block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusRec {
    /// year, month, day, hour, minute, second.
    pub timestamp: [u32; 6],
    pub program: Option<Ident>,
    pub version: Option<Ident>,
    pub comments: Vec<Ident>,
    pub metax: Vec<(Ident, PropertyValue)>,
    pub properties: Vec<PropertyRec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignRec {
    pub name: NameObj,
    pub cell_ref: CellRefRec,
    pub properties: Vec<PropertyRec>,
}

/// Packages all content of an EDIF file, unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdifFile {
    pub name: NameObj,
    pub status: Option<StatusRec>,
    /// Libraries in file order.
    pub libraries: Vec<LibraryRec>,
    /// Top-level `(comment ...)` forms.
    pub comments: Vec<Ident>,
    pub design: Option<DesignRec>,
}

impl EdifFile {
    /// Total number of cells over all libraries.
    pub fn num_cells(&self) -> usize {
        self.libraries.iter().map(|l| l.cells.len()).sum()
    }

    /// Parse from any buffered reader with the given configuration.
    pub fn parse_reader_with(
        reader: impl BufRead, config: &ParserConfig, pool: Arc<StringPool>
    ) -> Result<EdifFile> {
        config.validate()?;
        let t = clilog::stimer!("parse edif");
        let tok = EdifTokenizer::new(reader, pool, config.max_token_length)
            .with_intern_threshold(config.intern_threshold);
        let ret = EdifParser::new(tok).parse_all();
        clilog::finish!(t);
        if let Err(e) = &ret {
            clilog::error!(EDIF_PARSE, "{}", e);
        }
        ret
    }

    pub fn parse_reader(reader: impl BufRead) -> Result<EdifFile> {
        EdifFile::parse_reader_with(reader, &ParserConfig::default(),
                                    Arc::new(StringPool::new()))
    }

    pub fn parse_u8slice(s: &[u8]) -> Result<EdifFile> {
        EdifFile::parse_reader(s)
    }

    pub fn parse_str(s: &str) -> Result<EdifFile> {
        EdifFile::parse_u8slice(s.as_bytes())
    }

    /// Parse a file sequentially. Paths ending in `.gz` are
    /// decompressed on the fly.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<EdifFile> {
        EdifFile::parse_file_with(path, &ParserConfig::default())
    }

    pub fn parse_file_with(path: impl AsRef<Path>, config: &ParserConfig) -> Result<EdifFile> {
        let path = path.as_ref();
        let f = File::open(path)?;
        let pool = Arc::new(StringPool::new());
        if path.extension().map_or(false, |e| e == "gz") {
            let gz = flate2::read::GzDecoder::new(f);
            EdifFile::parse_reader_with(BufReader::new(gz), config, pool)
        }
        else {
            EdifFile::parse_reader_with(BufReader::new(f), config, pool)
        }
    }

    /// Parse an uncompressed file using several workers, each
    /// starting at a different byte offset.
    ///
    /// The result is identical to [EdifFile::parse_file].
    pub fn parse_file_parallel(path: impl AsRef<Path>, config: &ParserConfig) -> Result<EdifFile> {
        config.validate()?;
        let path = path.as_ref();
        if path.extension().map_or(false, |e| e == "gz") {
            clilog::warn!(EDIF_PARSE, "compressed input {} cannot be split, \
                                       parsing sequentially", path.display());
            return EdifFile::parse_file_with(path, config)
        }
        parallel::parse_file_parallel(path, config)
    }
}
