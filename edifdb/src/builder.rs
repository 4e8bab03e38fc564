//! Resolves parsed records into a linked [Netlist].
//!
//! The records of [EdifFile] refer to cells, instances and
//! ports by legal name. Building happens in three steps:
//! 1. libraries and cells are numbered sequentially, and the
//!    index ranges of each cell's ports, instances, nets and
//!    port instances are computed.
//! 2. ports of every cell are built in parallel, so that
//!    port-refs can then be linked against any cell.
//! 3. instances, nets and port instances are built in parallel,
//!    one task per cell.

use std::collections::{ HashMap, HashSet };
use std::path::Path;
use compact_str::{ CompactString, format_compact };
use indexmap::IndexMap;
use rayon::prelude::*;
use edifparse::{ CellRec, LibraryRec, PortRec, PropertyRec };
use edifparse::legal::{ ConcurrentReadLegalNameCache, parse_bus_range, bus_name };
use crate::*;

pub(crate) fn properties_of(recs: &[PropertyRec]) -> Properties {
    recs.iter().map(|p| (p.name.name.clone(), p.value.clone())).collect()
}

/// A cell record with its position in the arenas.
struct Slot<'i> {
    lib: LibraryId,
    rec: &'i CellRec,
    port_base: u32,
    inst_base: u32,
    net_base: u32,
    pin_base: u32,
}

/// Everything built for the contents of one cell.
struct Contents {
    instance_map: IndexMap<Ident, InstanceId>,
    net_map: IndexMap<Ident, NetId>,
    internal_nets: HashMap<Ident, NetId>,
    instances: Vec<Instance>,
    nets: Vec<Net>,
    pins: Vec<PortInst>,
}

pub(crate) fn collision(kind: &'static str, name: &str, container: &str) -> EdifError {
    clilog::error!(EDIF_COLLIDE, "{} {} already exists in {}",
                   kind, name, container);
    EdifError::Collision {
        kind,
        name: name.into(),
        container: container.into()
    }
}

pub(crate) fn unresolved(kind: &'static str, name: &str, context: &str) -> EdifError {
    clilog::error!(EDIF_REF, "unresolved {} reference {} in {}",
                   kind, name, context);
    EdifError::UnresolvedReference {
        kind,
        name: name.into(),
        context: context.into()
    }
}

pub(crate) fn build_port(rec_name: &Ident, width: u32, direction: PortDirection,
                         cell: CellId) -> Result<Port> {
    let range = parse_bus_range(rec_name);
    if width > 1 && range.is_none() {
        clilog::error!(EDIF_PARSE, "bus port {} has no [left:right] range", rec_name);
        return Err(EdifError::InvalidBusName { name: (&**rec_name).into() })
    }
    let bus: Ident = match range {
        Some(_) => bus_name(rec_name, false).into(),
        None => rec_name.clone()
    };
    Ok(Port {
        name: rec_name.clone(),
        cell, direction, width, range,
        bus_name: bus,
        properties: Properties::new(),
    })
}

/// The bit index of a port-ref, -1 for a scalar pin. `None` if
/// the member is outside the port.
pub(crate) fn member_index(port: &Port, member: Option<u32>) -> Option<i32> {
    match member {
        Some(m) if m < port.width => i32::try_from(m).ok(),
        Some(_) => None,
        // a single-bit bus referenced without member
        None if port.is_bus() && port.width == 1 => Some(0),
        None => Some(-1)
    }
}

pub(crate) fn bad_member(port: &Port, member: impl std::fmt::Display,
                         context: &str) -> EdifError {
    unresolved("port member", &format_compact!("{}[{}] (width {})",
                                               port.bus_name, member, port.width),
               context)
}

fn build_ports(
    slot: &Slot, cell: CellId,
    renames: &ConcurrentReadLegalNameCache<EntityRef>
) -> Result<(Vec<Port>, IndexMap<Ident, PortId>, HashMap<Ident, PortId>)> {
    let mut ports = Vec::with_capacity(slot.rec.ports.len());
    let mut by_key = IndexMap::with_capacity(slot.rec.ports.len());
    let mut by_legal = HashMap::with_capacity(slot.rec.ports.len());
    for (i, PortRec { name, width, direction, properties }) in slot.rec.ports.iter().enumerate() {
        let id = PortId(slot.port_base + i as u32);
        let mut port = build_port(&name.name, *width, *direction, cell)?;
        port.properties = properties_of(properties);
        let key: Ident = port.bus_key().as_str().into();
        if by_key.insert(key, id).is_some() ||
            by_legal.insert(name.legal_name().clone(), id).is_some() {
            return Err(collision("port", &name.name, &slot.rec.name.name))
        }
        if let Some(r) = &name.rename {
            renames.set_rename(EntityRef::Port(id), r.clone());
        }
        ports.push(port);
    }
    Ok((ports, by_key, by_legal))
}

fn build_contents(
    slot: &Slot, cell_id: CellId,
    lib_legal: &Ident,
    cell_ids: &HashMap<(Ident, Ident), CellId>,
    cells: &[Cell], ports: &[Port],
    renames: &ConcurrentReadLegalNameCache<EntityRef>
) -> Result<Contents> {
    let rec = slot.rec;
    let cell_name = &rec.name.name;
    let mut instance_map = IndexMap::with_capacity(rec.instances.len());
    let mut inst_by_legal = HashMap::with_capacity(rec.instances.len());
    let mut instances = Vec::with_capacity(rec.instances.len());

    for (i, irec) in rec.instances.iter().enumerate() {
        let id = InstanceId(slot.inst_base + i as u32);
        let lib = irec.cell_ref.library.as_ref().unwrap_or(lib_legal);
        let cell_type = match cell_ids.get(&(lib.clone(), irec.cell_ref.cell.clone())) {
            Some(c) => *c,
            None => return Err(unresolved(
                "cell", &format_compact!("{}/{}", lib, irec.cell_ref.cell),
                &format_compact!("{}/{}", cell_name, irec.name.name)))
        };
        if instance_map.insert(irec.name.name.clone(), id).is_some() ||
            inst_by_legal.insert(irec.name.legal_name().clone(), id).is_some() {
            return Err(collision("instance", &irec.name.name, cell_name))
        }
        if let Some(r) = &irec.name.rename {
            renames.set_rename(EntityRef::Instance(id), r.clone());
        }
        if let Some(r) = &irec.view.rename {
            renames.set_rename(EntityRef::InstanceView(id), r.clone());
        }
        instances.push(Instance {
            name: irec.name.name.clone(),
            parent: cell_id,
            cell_type,
            view: irec.view.name.clone(),
            properties: properties_of(&irec.properties),
            port_insts: IndexMap::new(),
        });
    }

    let mut net_map = IndexMap::with_capacity(rec.nets.len());
    let mut internal_nets = HashMap::new();
    let mut nets = Vec::with_capacity(rec.nets.len());
    let mut pins = Vec::new();
    let mut pin_id = slot.pin_base;

    for (j, nrec) in rec.nets.iter().enumerate() {
        let net_id = NetId(slot.net_base + j as u32);
        if net_map.insert(nrec.name.name.clone(), net_id).is_some() {
            return Err(collision("net", &nrec.name.name, cell_name))
        }
        if let Some(r) = &nrec.name.rename {
            renames.set_rename(EntityRef::Net(net_id), r.clone());
        }
        let mut net_pins = IndexMap::with_capacity(nrec.joined.len());
        for pr in &nrec.joined {
            let (owner, instance) = match &pr.instance {
                Some(iname) => match inst_by_legal.get(iname) {
                    Some(&iid) => {
                        let inst: &Instance = &instances[(iid.0 - slot.inst_base) as usize];
                        (inst.cell_type, Some(iid))
                    }
                    None => return Err(unresolved(
                        "instance", iname,
                        &format_compact!("{}/{}", cell_name, nrec.name.name)))
                },
                None => (cell_id, None)
            };
            let port_id = match cells[owner.index()].port_by_legal_name(&pr.port) {
                Some(p) => p,
                None => return Err(unresolved(
                    "port", &format_compact!("{}/{}", cells[owner.index()].name, pr.port),
                    &format_compact!("{}/{}", cell_name, nrec.name.name)))
            };
            let port = &ports[port_id.index()];
            let index = match member_index(port, pr.member) {
                Some(i) => i,
                None => return Err(bad_member(
                    port, pr.member.unwrap_or_default(),
                    &format_compact!("{}/{}", cell_name, nrec.name.name)))
            };
            let name = port.port_inst_name(index);
            let id = PortInstId(pin_id);
            pin_id += 1;
            let full_name: Ident = match instance {
                Some(iid) => {
                    let inst = &mut instances[(iid.0 - slot.inst_base) as usize];
                    if inst.port_insts.insert(name.clone(), id).is_some() {
                        return Err(collision("port instance", &name, &inst.name))
                    }
                    format!("{}{}{}", inst.name, HIER_SEP, name).into()
                }
                None => {
                    if internal_nets.insert(name.clone(), net_id).is_some() {
                        return Err(collision("port instance", &name, cell_name))
                    }
                    name.clone()
                }
            };
            if net_pins.insert(full_name, id).is_some() {
                return Err(collision("port instance", &name, &nrec.name.name))
            }
            pins.push(PortInst {
                name, port: port_id, instance, index,
                net: Some(net_id),
            });
        }
        nets.push(Net {
            name: nrec.name.name.clone(),
            parent: cell_id,
            properties: properties_of(&nrec.properties),
            port_insts: net_pins,
        });
    }

    Ok(Contents { instance_map, net_map, internal_nets, instances, nets, pins })
}

/// Fails if a cell transitively instantiates itself.
fn check_recursion(
    netlist: &Netlist,
    parents: &mut HashSet<CellId>,
    cell: CellId,
    done: &mut HashSet<CellId>
) -> Result<()> {
    if done.contains(&cell) {
        return Ok(())
    }
    if !parents.insert(cell) {
        let name = &netlist.cell(cell).name;
        clilog::error!(EDIF_REF, "cell {} has recursion which is NOT allowed", name);
        return Err(EdifError::RecursiveHierarchy { cell: (&**name).into() })
    }
    let mut parents = scopeguard::guard(parents, |parents| {
        parents.remove(&cell);
    });
    for &inst in netlist.cell(cell).instances.values() {
        check_recursion(netlist, &mut parents,
                        netlist.instance(inst).cell_type, done)?;
    }
    done.insert(cell);
    Ok(())
}

/// Fails if an instance of `cell_type` inside `parent` would
/// close a cycle: `parent` is `cell_type` or one of its
/// descendants.
pub(crate) fn check_instantiation(netlist: &Netlist, parent: CellId,
                                  cell_type: CellId) -> Result<()> {
    check_recursion(netlist, &mut HashSet::from([parent]), cell_type, &mut HashSet::new())
}

impl Netlist {
    /// Build a netlist from parsed records.
    pub fn from_edif(file: &EdifFile) -> Result<Netlist> {
        let time_build = clilog::stimer!("build netlist");
        let mut netlist = Netlist::new(file.name.name.clone());
        let renames = ConcurrentReadLegalNameCache::new();
        if let Some(r) = &file.name.rename {
            renames.set_rename(EntityRef::Netlist, r.clone());
        }

        // 1. number libraries and cells.
        let mut slots = Vec::with_capacity(file.num_cells());
        let mut cell_ids = HashMap::with_capacity(file.num_cells());
        let (mut n_ports, mut n_insts, mut n_nets, mut n_pins) = (0u32, 0u32, 0u32, 0u32);
        for LibraryRec { name, external, cells, .. } in &file.libraries {
            let lib = LibraryId(netlist.libs.len() as u32);
            let legal = name.legal_name().clone();
            if netlist.libraries.insert(legal.clone(), lib).is_some() {
                return Err(collision("library", &name.name, &netlist.name))
            }
            if let Some(r) = &name.rename {
                renames.set_rename(EntityRef::Library(lib), r.clone());
            }
            let mut library = Library::new(name.name.clone(), *external);
            for rec in cells {
                let id = CellId(slots.len() as u32);
                let cell_legal = rec.name.legal_name().clone();
                if library.cells.insert(cell_legal.clone(), id).is_some() {
                    return Err(collision("cell", &rec.name.name, &name.name))
                }
                cell_ids.insert((legal.clone(), cell_legal), id);
                slots.push(Slot {
                    lib, rec,
                    port_base: n_ports,
                    inst_base: n_insts,
                    net_base: n_nets,
                    pin_base: n_pins,
                });
                n_ports += rec.ports.len() as u32;
                n_insts += rec.instances.len() as u32;
                n_nets += rec.nets.len() as u32;
                n_pins += rec.nets.iter().map(|n| n.joined.len() as u32).sum::<u32>();
            }
            netlist.libs.push(library);
        }
        clilog::debug!(EDIF_PARSE, "numbered {} libraries and {} cells",
                       netlist.libs.len(), slots.len());

        // 2. ports.
        let built_ports = slots.par_iter().enumerate()
            .map(|(i, slot)| build_ports(slot, CellId(i as u32), &renames))
            .collect::<Result<Vec<_>>>()?;
        netlist.ports.reserve(n_ports as usize);
        netlist.cells.reserve(slots.len());
        for (i, (slot, (ports, by_key, by_legal))) in slots.iter().zip(built_ports).enumerate() {
            let rec = slot.rec;
            if let Some(r) = &rec.name.rename {
                renames.set_rename(EntityRef::Cell(CellId(i as u32)), r.clone());
            }
            if let Some(r) = &rec.view.rename {
                renames.set_rename(EntityRef::CellView(CellId(i as u32)), r.clone());
            }
            let mut cell = Cell::new(rec.name.name.clone(), slot.lib, rec.view.name.clone());
            cell.properties = properties_of(&rec.properties);
            cell.ports = by_key;
            cell.ports_by_legal = by_legal;
            netlist.cells.push(cell);
            netlist.ports.extend(ports);
        }

        // 3. instances, nets and port instances.
        let lib_legals = netlist.libraries.keys().cloned().collect::<Vec<_>>();
        let contents = slots.par_iter().enumerate()
            .map(|(i, slot)| build_contents(
                slot, CellId(i as u32), &lib_legals[slot.lib.index()],
                &cell_ids, &netlist.cells, &netlist.ports, &renames))
            .collect::<Result<Vec<_>>>()?;
        netlist.instances.reserve(n_insts as usize);
        netlist.nets.reserve(n_nets as usize);
        netlist.port_insts.reserve(n_pins as usize);
        for (cell, c) in netlist.cells.iter_mut().zip(contents) {
            cell.instances = c.instance_map;
            cell.nets = c.net_map;
            cell.internal_nets = c.internal_nets;
            netlist.instances.extend(c.instances);
            netlist.nets.extend(c.nets);
            netlist.port_insts.extend(c.pins);
        }

        if let Some(d) = &file.design {
            let top = match &d.cell_ref.library {
                Some(lib) => cell_ids.get(&(lib.clone(), d.cell_ref.cell.clone())).copied(),
                None => lib_legals.iter()
                    .find_map(|lib| cell_ids.get(&(lib.clone(), d.cell_ref.cell.clone())))
                    .copied()
            };
            let top = match top {
                Some(t) => t,
                None => return Err(unresolved("cell", &d.cell_ref.cell,
                                              &format_compact!("design {}", d.name.name)))
            };
            if let Some(r) = &d.name.rename {
                renames.set_rename(EntityRef::Design, r.clone());
            }
            netlist.design = Some(Design {
                name: d.name.name.clone(),
                top,
                properties: properties_of(&d.properties),
            });
        }
        netlist.status = file.status.clone();
        netlist.comments = file.comments.clone();
        netlist.renames = renames.into_plain();

        let mut done = HashSet::new();
        for cell in 0..netlist.cells.len() {
            check_recursion(&netlist, &mut HashSet::new(), CellId(cell as u32), &mut done)?;
        }
        clilog::finish!(time_build);
        let (c, i, n, p) = netlist.counts();
        clilog::info!(EDIF_PARSE, "netlist {}: {} cells, {} instances, {} nets, {} ports",
                      netlist.name, c, i, n, p);
        Ok(netlist)
    }

    /// Parse and build from a string.
    pub fn from_edif_str(s: &str) -> Result<Netlist> {
        Netlist::from_edif(&EdifFile::parse_str(s)?)
    }

    /// Parse and build from a file. With more than one thread
    /// configured, uncompressed files are parsed in parallel.
    pub fn from_edif_file(path: impl AsRef<Path>, config: &ParserConfig) -> Result<Netlist> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let file = match config.thread_count(size) {
            1 => EdifFile::parse_file_with(path, config)?,
            _ => EdifFile::parse_file_parallel(path, config)?
        };
        Netlist::from_edif(&file)
    }
}

/// The key used for `(library, cell)` in error messages.
pub(crate) fn cell_path(netlist: &Netlist, cell: CellId) -> CompactString {
    let c = netlist.cell(cell);
    format_compact!("{}/{}", netlist.library(c.library).name, c.name)
}
