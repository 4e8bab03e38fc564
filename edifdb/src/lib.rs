//! A hierarchical EDIF netlist database.
//!
//! Libraries, cells, ports, instances, nets and port instances
//! live in per-netlist arenas and refer to each other by index.
//! A [Netlist] is built from the records of [edifparse] with
//! [Netlist::from_edif], or decoded from the compact binary
//! format with [Netlist::decode].
//!
//! Hierarchical addresses ([HierInstance], [HierNet],
//! [HierPortInst]) are values layered over the arenas. The
//! resolution engine maps every hierarchical net to the single
//! net that drives it, see [Netlist::get_parent_net].

use std::collections::HashMap;
use compact_str::CompactString;
use indexmap::IndexMap;

pub use edifparse::{
    Ident, NameObj, PortDirection, PropertyKind, PropertyValue,
    ParserConfig, StatusRec, EdifFile,
};
use edifparse::legal::ReadLegalNameCache;

mod error;
pub use error::{ EdifError, Result };

mod builder;

mod eco;
pub use eco::DEFAULT_COLLISION_SUFFIX;

mod hier;
pub use hier::{ HierInstance, HierNet, HierPortInst };

mod resolve;
pub use resolve::{ NetAliases, GLOBAL_LOGIC0, GLOBAL_LOGIC1 };

mod binary;
pub use binary::{ BINARY_FORMAT_TAG, BINARY_FORMAT_VERSION };

mod writer;
pub use writer::WriterConfig;

mod summary;

mod transform;

/// Name of the library holding leaf cells.
pub const PRIMITIVES_LIBRARY: &str = "hdi_primitives";
/// Name of the library holding all other cells.
pub const WORK_LIBRARY: &str = "work";
/// Separator of hierarchical names and net port-inst keys.
pub const HIER_SEP: &str = "/";
/// Default view name of cells and instances.
pub const DEFAULT_VIEW: &str = "netlist";

macro_rules! define_id {
    ($($(#[$m:meta])* $name:ident),* $(,)?) => {$(
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    )*}
}

define_id!(
    /// Index of a library in [Netlist::libs].
    LibraryId,
    /// Index of a cell in [Netlist::cells].
    CellId,
    /// Index of an instance in [Netlist::instances].
    InstanceId,
    /// Index of a net in [Netlist::nets].
    NetId,
    /// Index of a port in [Netlist::ports].
    PortId,
    /// Index of a port instance in [Netlist::port_insts].
    PortInstId,
);

/// An object that may carry a legal rename.
///
/// Renames read from a file are kept in [Netlist::renames] under
/// this key, so that two objects sharing a display name keep
/// their own renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Netlist,
    Design,
    Library(LibraryId),
    Cell(CellId),
    /// the view of a cell.
    CellView(CellId),
    Instance(InstanceId),
    /// the view reference of an instance.
    InstanceView(InstanceId),
    Net(NetId),
    Port(PortId),
}

pub type Properties = IndexMap<Ident, PropertyValue>;

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Library {
    pub name: Ident,
    /// declared as `(external ...)`.
    pub external: bool,
    /// Cells keyed by legal name.
    pub cells: IndexMap<Ident, CellId>,
}

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: Ident,
    pub library: LibraryId,
    pub view: Ident,
    pub properties: Properties,
    /// Ports keyed by bus key: the bare name for scalar ports,
    /// and the bus name with the open bracket (`data[`) for buses.
    pub ports: IndexMap<Ident, PortId>,
    /// Legal name to port, kept alongside `ports`.
    ports_by_legal: HashMap<Ident, PortId>,
    pub instances: IndexMap<Ident, InstanceId>,
    pub nets: IndexMap<Ident, NetId>,
    /// Boundary port-inst name (`clk`, `data[3]`) to the internal
    /// net connected to it.
    pub internal_nets: HashMap<Ident, NetId>,
}

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Port {
    pub name: Ident,
    pub cell: CellId,
    pub direction: PortDirection,
    pub width: u32,
    /// `[left:right]` of a bus, `None` for scalar ports.
    pub range: Option<(u32, u32)>,
    /// the name without the bus range.
    pub bus_name: Ident,
    pub properties: Properties,
}

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: Ident,
    pub parent: CellId,
    pub cell_type: CellId,
    /// the view of `cell_type` in use.
    pub view: Ident,
    pub properties: Properties,
    /// Port instances keyed by pin name (`I0`, `data[3]`).
    pub port_insts: IndexMap<Ident, PortInstId>,
}

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Net {
    pub name: Ident,
    pub parent: CellId,
    pub properties: Properties,
    /// Joined port instances, keyed by `inst/pin` or by the pin
    /// name for boundary pins.
    pub port_insts: IndexMap<Ident, PortInstId>,
}

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct PortInst {
    /// pin name, `clk` or `data[3]`.
    pub name: Ident,
    pub port: PortId,
    /// `None` for a pin on the boundary of the enclosing cell.
    pub instance: Option<InstanceId>,
    /// bit index into the port, -1 for scalar ports.
    pub index: i32,
    pub net: Option<NetId>,
}

#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Design {
    pub name: Ident,
    pub top: CellId,
    pub properties: Properties,
}

/// Lazily built results of the resolution engine.
#[derive(Debug, Clone, Default)]
struct ResolveCache {
    parent_nets: Option<HashMap<HierNet, HierNet>>,
    physical_pins: HashMap<HierNet, Vec<HierPortInst>>,
    gnd_pins: Vec<HierPortInst>,
    vcc_pins: Vec<HierPortInst>,
}

/// The netlist storage.
///
/// The public members are all READ-ONLY outside. Modify them
/// through the mutation methods, which keep the back references
/// consistent and invalidate the resolution caches.
///
/// Removed objects stay in the arenas, unreachable from the
/// library map.
#[readonly::make]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Netlist {
    /// name of the `(edif ...)` form.
    pub name: Ident,
    /// Libraries keyed by legal name, in file order.
    pub libraries: IndexMap<Ident, LibraryId>,
    pub libs: Vec<Library>,
    pub cells: Vec<Cell>,
    pub ports: Vec<Port>,
    pub instances: Vec<Instance>,
    pub nets: Vec<Net>,
    pub port_insts: Vec<PortInst>,
    pub design: Option<Design>,
    pub status: Option<StatusRec>,
    /// top-level comments.
    pub comments: Vec<Ident>,
    /// Legal renames read from the source.
    pub renames: ReadLegalNameCache<EntityRef>,
    /// counter for generated unique names.
    namespace_unique_count: u64,
    cache: ResolveCache,
}

impl Library {
    pub(crate) fn new(name: Ident, external: bool) -> Library {
        Library { name, external, cells: IndexMap::new() }
    }
}

impl Cell {
    pub(crate) fn new(name: Ident, library: LibraryId, view: Ident) -> Cell {
        Cell {
            name, library, view,
            properties: Properties::new(),
            ports: IndexMap::new(),
            ports_by_legal: HashMap::new(),
            instances: IndexMap::new(),
            nets: IndexMap::new(),
            internal_nets: HashMap::new(),
        }
    }

    /// A cell without instances and nets.
    #[inline]
    pub fn is_leaf_or_black_box(&self) -> bool {
        self.instances.is_empty() && self.nets.is_empty()
    }

    /// Look up a port by name, bus key (`data[`), bus name
    /// (`data`) or legal name.
    pub fn port_by_name(&self, name: &str) -> Option<PortId> {
        if let Some(&p) = self.ports.get(name) {
            return Some(p)
        }
        let mut key = CompactString::from(name);
        key.push('[');
        if let Some(&p) = self.ports.get(key.as_str()) {
            return Some(p)
        }
        self.ports_by_legal.get(name).copied()
    }

    /// Look up a port by legal name (as used by port-refs).
    pub fn port_by_legal_name(&self, legal: &str) -> Option<PortId> {
        self.ports_by_legal.get(legal).copied()
            .or_else(|| self.port_by_name(legal))
    }

    /// Look up the port of a pin name (`data[5]` finds `data[`).
    pub fn port_by_pin_name(&self, pin: &str) -> Option<PortId> {
        self.ports.get(pin).copied().or_else(|| {
            let root = edifparse::legal::root_bus_name(pin, true);
            self.ports.get(root).copied()
        })
    }
}

impl Port {
    /// The key of this port in [Cell::ports].
    pub fn bus_key(&self) -> CompactString {
        let mut key = CompactString::from(&*self.bus_name);
        if self.range.is_some() {
            key.push('[');
        }
        key
    }

    #[inline]
    pub fn is_bus(&self) -> bool {
        self.range.is_some()
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    #[inline]
    pub fn is_inout(&self) -> bool {
        self.direction == PortDirection::InOut
    }

    /// `data[7:0]` is little endian, `data[0:7]` is not.
    #[inline]
    pub fn is_little_endian(&self) -> bool {
        matches!(self.range, Some((l, r)) if l > r)
    }

    /// The bit number named by member index `index`.
    ///
    /// Member index 0 is the leftmost bit of the range.
    pub fn bit_of_index(&self, index: i32) -> Option<i64> {
        let (l, _) = self.range?;
        Some(match self.is_little_endian() {
            true => l as i64 - index as i64,
            false => l as i64 + index as i64,
        })
    }

    /// The pin name of member `index`: `data[5]` for bit 2 of
    /// `data[7:0]`, and the plain name for scalar ports.
    pub fn port_inst_name(&self, index: i32) -> Ident {
        match self.bit_of_index(index) {
            Some(bit) if index >= 0 => {
                format!("{}[{}]", self.bus_name, bit).into()
            }
            _ => match self.is_bus() {
                true => self.bus_name.clone(),
                false => self.name.clone(),
            }
        }
    }

    /// All pin names of this port in member order.
    pub fn port_inst_names(&self) -> Vec<Ident> {
        match self.is_bus() {
            true => (0..self.width as i32).map(|i| self.port_inst_name(i)).collect(),
            false => vec![self.name.clone()],
        }
    }
}

impl PortInst {
    #[inline]
    pub fn is_top_level_port(&self) -> bool {
        self.instance.is_none()
    }

    /// The key of this pin in [Net::port_insts].
    pub fn full_name(&self, netlist: &Netlist) -> Ident {
        match self.instance {
            Some(inst) => format!("{}{}{}", netlist.instance(inst).name,
                                  HIER_SEP, self.name).into(),
            None => self.name.clone()
        }
    }
}

impl Netlist {
    /// An empty netlist without libraries or design.
    pub fn new(name: impl Into<Ident>) -> Netlist {
        Netlist {
            name: name.into(),
            libraries: IndexMap::new(),
            libs: Vec::new(),
            cells: Vec::new(),
            ports: Vec::new(),
            instances: Vec::new(),
            nets: Vec::new(),
            port_insts: Vec::new(),
            design: None,
            status: None,
            comments: Vec::new(),
            renames: ReadLegalNameCache::new(),
            namespace_unique_count: 0,
            cache: ResolveCache::default(),
        }
    }

    #[inline]
    pub fn library(&self, id: LibraryId) -> &Library {
        &self.libs[id.index()]
    }

    #[inline]
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    #[inline]
    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.index()]
    }

    #[inline]
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.index()]
    }

    #[inline]
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    #[inline]
    pub fn port_inst(&self, id: PortInstId) -> &PortInst {
        &self.port_insts[id.index()]
    }

    /// The display name of an object.
    pub fn name_of(&self, e: EntityRef) -> Ident {
        match e {
            EntityRef::Netlist => self.name.clone(),
            EntityRef::Design => self.design.as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| self.name.clone()),
            EntityRef::Library(id) => self.library(id).name.clone(),
            EntityRef::Cell(id) => self.cell(id).name.clone(),
            EntityRef::CellView(id) => self.cell(id).view.clone(),
            EntityRef::Instance(id) => self.instance(id).name.clone(),
            EntityRef::InstanceView(id) => self.instance(id).view.clone(),
            EntityRef::Net(id) => self.net(id).name.clone(),
            EntityRef::Port(id) => self.port(id).name.clone(),
        }
    }

    /// The rename read from the source if any, else the name.
    pub fn legal_name(&self, e: EntityRef) -> Ident {
        use edifparse::legal::LegalNameLookup;
        self.renames.legal_name(&e, &self.name_of(e))
    }

    /// Look up a library by legal name.
    pub fn library_by_name(&self, name: &str) -> Option<LibraryId> {
        self.libraries.get(name).copied()
    }

    /// Look up a cell by library and cell legal names.
    pub fn cell_by_name(&self, library: &str, cell: &str) -> Option<CellId> {
        let lib = self.library_by_name(library)?;
        self.library(lib).cells.get(cell).copied()
    }

    /// Iterate over the cells reachable from the library map.
    pub fn iter_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.libraries.values()
            .flat_map(move |&l| self.library(l).cells.values().copied())
    }

    /// The top cell of the design.
    pub fn top_cell(&self) -> Result<CellId> {
        self.design.as_ref().map(|d| d.top).ok_or(EdifError::MissingDesign)
    }

    /// Value of a design property, e.g. `PART`.
    pub fn design_property(&self, key: &str) -> Option<&PropertyValue> {
        self.design.as_ref()?.properties.get(key)
    }

    /// The target part name, read from the design `PART` property.
    pub fn part_name(&self) -> Option<&str> {
        self.design_property("PART").map(|p| &*p.value)
    }

    /// Properties of an object. Libraries and views carry none.
    pub fn properties(&self, e: EntityRef) -> Option<&Properties> {
        match e {
            EntityRef::Design => self.design.as_ref().map(|d| &d.properties),
            EntityRef::Cell(id) => Some(&self.cell(id).properties),
            EntityRef::Port(id) => Some(&self.port(id).properties),
            EntityRef::Instance(id) => Some(&self.instance(id).properties),
            EntityRef::Net(id) => Some(&self.net(id).properties),
            _ => None
        }
    }

    /// Number of reachable cells, instances, nets and ports.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        self.iter_cells().fold((0, 0, 0, 0), |(c, i, n, p), id| {
            let cell = self.cell(id);
            (c + 1, i + cell.instances.len(), n + cell.nets.len(), p + cell.ports.len())
        })
    }
}
