//! Netlist errors.

use compact_str::CompactString;
use edifparse::EdifParseError;

#[derive(Debug, thiserror::Error)]
pub enum EdifError {
    #[error(transparent)]
    Parse(#[from] EdifParseError),
    /// An instance, design or port-ref names something that
    /// does not exist.
    #[error("unresolved {kind} reference {name} in {context}")]
    UnresolvedReference {
        kind: &'static str,
        name: CompactString,
        context: CompactString,
    },
    /// Two different objects under one key of a container.
    #[error("{kind} {name} already exists in {container}")]
    Collision {
        kind: &'static str,
        name: CompactString,
        container: CompactString,
    },
    #[error("binary netlist format mismatch: expected {expected:?}, found {found:?}")]
    BinaryFormatMismatch { expected: String, found: String },
    #[error("corrupt binary netlist: {0}")]
    BinaryFormat(String),
    #[error("port {port} is too wide ({width}) for the binary format")]
    PortWidthOverflow { port: CompactString, width: u32 },
    /// More than one driver found while resolving the parent
    /// of a net.
    #[error("multiple sources on net {net}: {first} and {second}")]
    MultipleSources {
        net: CompactString,
        first: CompactString,
        second: CompactString,
    },
    #[error("could not identify parent net of {net}: no driver or top-level input found")]
    UndrivenNet { net: CompactString },
    #[error("bus port {name} has no [left:right] range")]
    InvalidBusName { name: CompactString },
    #[error("cell {cell} instantiates itself through the hierarchy")]
    RecursiveHierarchy { cell: CompactString },
    /// Libraries whose cells instantiate each other, so that no
    /// library can be written before the others.
    #[error("circular dependency between libraries {libraries}")]
    CircularLibraries { libraries: CompactString },
    #[error("netlist has no design (top cell)")]
    MissingDesign,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = EdifError> = std::result::Result<T, E>;
