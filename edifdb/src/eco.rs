//! ECO commands: structural edits of a [Netlist].
//!
//! Keys are checked on insert. Inserting a different object
//! under an existing key fails with [EdifError::Collision], while
//! re-inserting the same object does nothing. Every structural
//! edit drops the parent net map.

use std::hash::Hash;
use compact_str::format_compact;
use indexmap::IndexMap;
use edifparse::legal::make_edif_compatible;
use crate::*;
use crate::builder::{
    build_port, collision, unresolved, check_instantiation, member_index, bad_member,
};

/// Suffix used by [Netlist::add_cell_rename_duplicates] by default.
pub const DEFAULT_COLLISION_SUFFIX: &str = "collisionRename";

fn insert_unique<K: Hash + Eq, V: Copy + Eq>(
    map: &mut IndexMap<K, V>, key: K, value: V,
    kind: &'static str, name: &str, container: &str
) -> Result<()> {
    match map.get(&key) {
        Some(&v) if v == value => Ok(()),
        Some(_) => Err(collision(kind, name, container)),
        None => {
            map.insert(key, value);
            Ok(())
        }
    }
}

/// `name`, with a generated rename if it is not a legal EDIF
/// identifier.
pub(crate) fn legal_name_obj(name: &str) -> NameObj {
    let legal = make_edif_compatible(name);
    match legal == name {
        true => NameObj::new(name.into()),
        false => NameObj::renamed(name.into(), legal.as_str().into())
    }
}

impl Netlist {
    pub(crate) fn set_rename_of(&mut self, e: EntityRef, name: &NameObj) {
        match &name.rename {
            Some(r) => self.renames.set_rename(e, r.clone()),
            None => { self.renames.remove(&e); }
        }
    }

    pub fn add_library(&mut self, name: NameObj, external: bool) -> Result<LibraryId> {
        if self.libraries.contains_key(name.legal_name()) {
            return Err(collision("library", &name.name, &self.name))
        }
        let id = LibraryId(self.libs.len() as u32);
        self.libraries.insert(name.legal_name().clone(), id);
        self.libs.push(Library::new(name.name.clone(), external));
        self.set_rename_of(EntityRef::Library(id), &name);
        Ok(id)
    }

    fn get_or_create_library(&mut self, name: &str) -> LibraryId {
        match self.library_by_name(name) {
            Some(l) => l,
            None => {
                let id = LibraryId(self.libs.len() as u32);
                self.libraries.insert(name.into(), id);
                self.libs.push(Library::new(name.into(), false));
                id
            }
        }
    }

    /// The library of leaf cells, created on first use.
    pub fn primitives_library(&mut self) -> LibraryId {
        self.get_or_create_library(PRIMITIVES_LIBRARY)
    }

    /// The library of hierarchical cells, created on first use.
    pub fn work_library(&mut self) -> LibraryId {
        self.get_or_create_library(WORK_LIBRARY)
    }

    /// Create an empty cell in `lib`.
    pub fn add_cell(&mut self, lib: LibraryId, name: NameObj) -> Result<CellId> {
        if self.library(lib).cells.contains_key(name.legal_name()) {
            return Err(collision("cell", &name.name, &self.library(lib).name))
        }
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Cell::new(name.name.clone(), lib, DEFAULT_VIEW.into()));
        self.libs[lib.index()].cells.insert(name.legal_name().clone(), id);
        self.set_rename_of(EntityRef::Cell(id), &name);
        self.reset_parent_net_map();
        Ok(id)
    }

    /// Put an existing cell into `lib` under its legal name,
    /// moving it out of its current library.
    pub fn insert_cell(&mut self, lib: LibraryId, cell: CellId) -> Result<()> {
        let key = self.legal_name(EntityRef::Cell(cell));
        let name = self.cell(cell).name.clone();
        let container = self.library(lib).name.clone();
        insert_unique(&mut self.libs[lib.index()].cells, key.clone(), cell,
                      "cell", &name, &container)?;
        let old = self.cell(cell).library;
        if old != lib {
            self.libs[old.index()].cells.shift_remove(&key);
            self.cells[cell.index()].library = lib;
        }
        self.reset_parent_net_map();
        Ok(())
    }

    /// Like [Netlist::insert_cell], but a cell colliding with a
    /// different cell is renamed to `<name>_RW_<suffix>`, with
    /// `_<n>` appended until the name is free.
    pub fn add_cell_rename_duplicates(&mut self, lib: LibraryId, cell: CellId,
                                      suffix: Option<&str>) -> Result<()> {
        let key = self.legal_name(EntityRef::Cell(cell));
        match self.library(lib).cells.get(&key) {
            Some(&c) if c != cell => {},
            _ => return self.insert_cell(lib, cell)
        }
        let base = format_compact!("{}_RW_{}", self.cell(cell).name,
                                   suffix.unwrap_or(DEFAULT_COLLISION_SUFFIX));
        let mut name = base.clone();
        let mut n = 0;
        while self.library(lib).cells.contains_key(make_edif_compatible(&name).as_str()) {
            name = format_compact!("{}_{}", base, n);
            n += 1;
        }
        clilog::warn!(EDIF_COLLIDE, "cell {} collides in library {}, renamed to {}",
                      self.cell(cell).name, self.library(lib).name, name);
        let renamed = legal_name_obj(&name);
        let old = self.cell(cell).library;
        self.libs[old.index()].cells.shift_remove(&key);
        self.cells[cell.index()].name = renamed.name.clone();
        self.set_rename_of(EntityRef::Cell(cell), &renamed);
        self.insert_cell(lib, cell)
    }

    /// Remove a cell from its library.
    pub fn remove_cell(&mut self, cell: CellId) -> bool {
        let key = self.legal_name(EntityRef::Cell(cell));
        let lib = self.cell(cell).library;
        let removed = self.libs[lib.index()].cells.get(&key) == Some(&cell);
        if removed {
            self.libs[lib.index()].cells.shift_remove(&key);
            self.reset_parent_net_map();
        }
        removed
    }

    pub fn add_port(&mut self, cell: CellId, name: NameObj,
                    direction: PortDirection, width: u32) -> Result<PortId> {
        let id = PortId(self.ports.len() as u32);
        let port = build_port(&name.name, width, direction, cell)?;
        let key: Ident = port.bus_key().as_str().into();
        let c = &mut self.cells[cell.index()];
        if c.ports.contains_key(&key) || c.ports_by_legal.contains_key(name.legal_name()) {
            return Err(collision("port", &name.name, &c.name))
        }
        c.ports.insert(key, id);
        c.ports_by_legal.insert(name.legal_name().clone(), id);
        self.ports.push(port);
        self.set_rename_of(EntityRef::Port(id), &name);
        self.reset_parent_net_map();
        Ok(id)
    }

    /// Remove a port from its cell, disconnecting its boundary
    /// pins and the pins of all instances of the cell.
    pub fn remove_port(&mut self, port: PortId) -> bool {
        let p = self.port(port);
        let (cell, key) = (p.cell, p.bus_key());
        if self.cell(cell).ports.get(key.as_str()) != Some(&port) {
            return false
        }
        let boundary = self.cell(cell).internal_nets.values()
            .flat_map(|&n| self.net(n).port_insts.values().copied())
            .filter(|&pi| {
                let pi = self.port_inst(pi);
                pi.instance.is_none() && pi.port == port
            });
        let outside = self.instances.iter()
            .filter(|i| i.cell_type == cell)
            .flat_map(|i| i.port_insts.values().copied())
            .filter(|&pi| self.port_inst(pi).port == port);
        let pins = boundary.chain(outside).collect::<Vec<_>>();
        for pi in pins {
            self.disconnect(pi);
        }
        let legal = self.legal_name(EntityRef::Port(port));
        let c = &mut self.cells[cell.index()];
        c.ports.shift_remove(key.as_str());
        c.ports_by_legal.remove(&legal);
        self.reset_parent_net_map();
        true
    }

    /// Create an instance of `cell_type` inside `parent`.
    ///
    /// Fails with [EdifError::RecursiveHierarchy] if `parent` is
    /// `cell_type` or instantiated somewhere below it.
    pub fn add_instance(&mut self, parent: CellId, name: NameObj,
                        cell_type: CellId) -> Result<InstanceId> {
        if self.cell(parent).instances.contains_key(&name.name) {
            return Err(collision("instance", &name.name, &self.cell(parent).name))
        }
        check_instantiation(self, parent, cell_type)?;
        let id = InstanceId(self.instances.len() as u32);
        let view = self.cell(cell_type).view.clone();
        self.instances.push(Instance {
            name: name.name.clone(),
            parent, cell_type, view,
            properties: Properties::new(),
            port_insts: IndexMap::new(),
        });
        self.cells[parent.index()].instances.insert(name.name.clone(), id);
        self.set_rename_of(EntityRef::Instance(id), &name);
        self.reset_parent_net_map();
        Ok(id)
    }

    /// Put an existing instance into its parent cell under its
    /// name.
    pub fn insert_instance(&mut self, inst: InstanceId) -> Result<()> {
        let i = self.instance(inst);
        let (parent, name) = (i.parent, i.name.clone());
        check_instantiation(self, parent, i.cell_type)?;
        let container = self.cell(parent).name.clone();
        insert_unique(&mut self.cells[parent.index()].instances, name.clone(), inst,
                      "instance", &name, &container)?;
        self.reset_parent_net_map();
        Ok(())
    }

    /// Like [Netlist::add_instance], appending `_<n>` to the name
    /// while it is taken.
    pub fn add_instance_unique_name(&mut self, parent: CellId, name: &str,
                                    cell_type: CellId) -> Result<InstanceId> {
        let mut unique = CompactString::from(name);
        while self.cell(parent).instances.contains_key(unique.as_str()) {
            unique = format_compact!("{}_{}", name, self.namespace_unique_count);
            self.namespace_unique_count += 1;
        }
        self.add_instance(parent, NameObj::new(unique.as_str().into()), cell_type)
    }

    /// Rename an instance, re-keying it in its parent and in the
    /// nets of its pins.
    pub fn rename_instance(&mut self, inst: InstanceId, name: NameObj) -> Result<()> {
        let i = self.instance(inst);
        let (parent, old) = (i.parent, i.name.clone());
        match self.cell(parent).instances.get(&name.name) {
            Some(&other) if other != inst => {
                return Err(collision("instance", &name.name, &self.cell(parent).name))
            }
            _ => {}
        }
        let pins = i.port_insts.values().copied().collect::<Vec<_>>();
        let mut old_keys = Vec::with_capacity(pins.len());
        for &p in &pins {
            old_keys.push(self.port_inst(p).full_name(self));
        }
        self.instances[inst.index()].name = name.name.clone();
        self.set_rename_of(EntityRef::Instance(inst), &name);
        if let Some((idx, _, v)) = self.cells[parent.index()].instances.shift_remove_full(&old) {
            self.cells[parent.index()].instances.shift_insert(idx, name.name.clone(), v);
        }
        for (p, old_key) in pins.into_iter().zip(old_keys) {
            let new_key = self.port_inst(p).full_name(self);
            if let Some(n) = self.port_inst(p).net {
                let net_pins = &mut self.nets[n.index()].port_insts;
                if let Some((idx, _, v)) = net_pins.shift_remove_full(&old_key) {
                    net_pins.shift_insert(idx, new_key, v);
                }
            }
        }
        self.reset_parent_net_map();
        Ok(())
    }

    /// Remove an instance from its parent, disconnecting all its
    /// pins.
    pub fn remove_instance(&mut self, inst: InstanceId) -> bool {
        let i = self.instance(inst);
        let parent = i.parent;
        if self.cell(parent).instances.get(&i.name) != Some(&inst) {
            return false
        }
        let name = i.name.clone();
        let pins = i.port_insts.values().copied().collect::<Vec<_>>();
        for p in pins {
            self.disconnect(p);
        }
        self.cells[parent.index()].instances.shift_remove(&name);
        self.reset_parent_net_map();
        true
    }

    pub fn add_net(&mut self, parent: CellId, name: NameObj) -> Result<NetId> {
        if self.cell(parent).nets.contains_key(&name.name) {
            return Err(collision("net", &name.name, &self.cell(parent).name))
        }
        let id = NetId(self.nets.len() as u32);
        self.nets.push(Net {
            name: name.name.clone(),
            parent,
            properties: Properties::new(),
            port_insts: IndexMap::new(),
        });
        self.cells[parent.index()].nets.insert(name.name.clone(), id);
        self.set_rename_of(EntityRef::Net(id), &name);
        self.reset_parent_net_map();
        Ok(id)
    }

    /// Put an existing net into its parent cell under its name.
    pub fn insert_net(&mut self, net: NetId) -> Result<()> {
        let n = self.net(net);
        let (parent, name) = (n.parent, n.name.clone());
        let container = self.cell(parent).name.clone();
        insert_unique(&mut self.cells[parent.index()].nets, name.clone(), net,
                      "net", &name, &container)?;
        self.reset_parent_net_map();
        Ok(())
    }

    /// Remove a net from its parent, disconnecting all its pins.
    pub fn remove_net(&mut self, net: NetId) -> bool {
        let n = self.net(net);
        let parent = n.parent;
        if self.cell(parent).nets.get(&n.name) != Some(&net) {
            return false
        }
        let name = n.name.clone();
        let pins = n.port_insts.values().copied().collect::<Vec<_>>();
        for p in pins {
            self.disconnect(p);
        }
        self.cells[parent.index()].nets.shift_remove(&name);
        self.reset_parent_net_map();
        true
    }

    /// Join pin `index` of port `port_name` to `net`. The pin
    /// belongs to `instance`, or to the boundary of the net's
    /// cell if `instance` is `None`. Use -1 for scalar ports.
    pub fn connect(&mut self, net: NetId, instance: Option<InstanceId>,
                   port_name: &str, index: i32) -> Result<PortInstId> {
        let parent = self.net(net).parent;
        let owner = match instance {
            Some(i) if self.instance(i).parent != parent => {
                return Err(unresolved("instance", &self.instance(i).name,
                                      &self.net(net).name))
            }
            Some(i) => self.instance(i).cell_type,
            None => parent
        };
        let port = match self.cell(owner).port_by_name(port_name) {
            Some(p) => p,
            None => return Err(unresolved("port", port_name, &self.cell(owner).name))
        };
        let member = match index {
            -1 => None,
            i => Some(u32::try_from(i)
                      .map_err(|_| bad_member(self.port(port), i, &self.net(net).name))?)
        };
        let index = match member_index(self.port(port), member) {
            Some(i) => i,
            None => return Err(bad_member(self.port(port), index, &self.net(net).name))
        };
        let name = self.port(port).port_inst_name(index);
        let id = PortInstId(self.port_insts.len() as u32);
        match instance {
            Some(i) => {
                let inst = &self.instances[i.index()];
                if inst.port_insts.contains_key(&name) {
                    return Err(collision("port instance", &name, &inst.name))
                }
                self.instances[i.index()].port_insts.insert(name.clone(), id);
            }
            None => {
                let cell = &mut self.cells[parent.index()];
                if cell.internal_nets.contains_key(&name) {
                    return Err(collision("port instance", &name, &cell.name))
                }
                cell.internal_nets.insert(name.clone(), net);
            }
        }
        self.port_insts.push(PortInst {
            name, port, instance, index,
            net: Some(net),
        });
        let full_name = self.port_inst(id).full_name(self);
        self.nets[net.index()].port_insts.insert(full_name, id);
        self.reset_parent_net_map();
        Ok(id)
    }

    /// Detach a pin from its net and instance.
    pub fn disconnect(&mut self, pin: PortInstId) -> bool {
        let pi = self.port_inst(pin);
        if pi.net.is_none() && pi.instance.is_none() {
            return false
        }
        let full_name = pi.full_name(self);
        let (name, net, instance) = (pi.name.clone(), pi.net, pi.instance);
        if let Some(n) = net {
            self.nets[n.index()].port_insts.shift_remove(&full_name);
            if instance.is_none() {
                let cell = &mut self.cells[self.nets[n.index()].parent.index()];
                if cell.internal_nets.get(&name) == Some(&n) {
                    cell.internal_nets.remove(&name);
                }
            }
        }
        if let Some(i) = instance {
            self.instances[i.index()].port_insts.shift_remove(&name);
        }
        let pi = &mut self.port_insts[pin.index()];
        pi.net = None;
        pi.instance = None;
        self.reset_parent_net_map();
        true
    }

    /// Set a property of a design, cell, port, instance or net,
    /// returning the previous value.
    pub fn set_property(&mut self, e: EntityRef, key: impl Into<Ident>,
                        value: PropertyValue) -> Result<Option<PropertyValue>> {
        let props = match e {
            EntityRef::Design => self.design.as_mut().map(|d| &mut d.properties),
            EntityRef::Cell(id) => Some(&mut self.cells[id.index()].properties),
            EntityRef::Port(id) => Some(&mut self.ports[id.index()].properties),
            EntityRef::Instance(id) => Some(&mut self.instances[id.index()].properties),
            EntityRef::Net(id) => Some(&mut self.nets[id.index()].properties),
            _ => None
        };
        match props {
            Some(p) => Ok(p.insert(key.into(), value)),
            None => Err(unresolved("property owner", &self.name_of(e), &self.name))
        }
    }

    /// Drop all instances and nets of a cell, leaving its
    /// interface.
    pub fn make_primitive(&mut self, cell: CellId) {
        let nets = self.cell(cell).nets.values().copied().collect::<Vec<_>>();
        for n in nets {
            self.remove_net(n);
        }
        let insts = self.cell(cell).instances.values().copied().collect::<Vec<_>>();
        for i in insts {
            self.remove_instance(i);
        }
        self.cells[cell.index()].internal_nets.clear();
        self.reset_parent_net_map();
    }

    /// Set the top cell of the design.
    pub fn set_design(&mut self, name: NameObj, top: CellId) {
        let properties = self.design.take().map(|d| d.properties).unwrap_or_default();
        self.design = Some(Design { name: name.name.clone(), top, properties });
        self.set_rename_of(EntityRef::Design, &name);
        self.reset_parent_net_map();
    }
}
