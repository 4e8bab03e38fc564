//! Whole-netlist transforms: pruning unused cells, moving a cell
//! tree between netlists and renaming the design.

use std::collections::{ HashMap, HashSet };
use compact_str::format_compact;
use edifparse::legal::{ LegalNameLookup, make_edif_compatible };
use crate::*;
use crate::builder::{ collision, unresolved };
use crate::eco::legal_name_obj;

/// The name of `e` in `src`, carrying its rename.
fn name_obj_in(src: &Netlist, e: EntityRef) -> NameObj {
    NameObj { name: src.name_of(e), rename: src.renames.rename_of(&e) }
}

impl Netlist {
    /// Cells instantiated anywhere below the top cell, the top
    /// cell included.
    fn used_cells(&self) -> Result<HashSet<CellId>> {
        let top = self.top_cell()?;
        let mut used = HashSet::from([top]);
        let mut stack = vec![top];
        while let Some(c) = stack.pop() {
            for &i in self.cell(c).instances.values() {
                let ct = self.instance(i).cell_type;
                if used.insert(ct) {
                    stack.push(ct);
                }
            }
        }
        Ok(used)
    }

    fn remove_unused_cells_in(&mut self, libs: &[LibraryId]) -> Result<usize> {
        let used = self.used_cells()?;
        for &c in &used {
            let lib = self.cell(c).library;
            let key = self.legal_name(EntityRef::Library(lib));
            if self.libraries.get(&key) != Some(&lib) {
                return Err(unresolved("library", &self.library(lib).name,
                                      &self.cell(c).name))
            }
        }
        let unused = libs.iter()
            .flat_map(|&l| self.library(l).cells.values().copied())
            .filter(|c| !used.contains(c))
            .collect::<Vec<_>>();
        for &c in &unused {
            self.remove_cell(c);
        }
        clilog::info!(EDIF_PRUNE, "removed {} unused cells", unused.len());
        Ok(unused.len())
    }

    /// Remove cells of the work library that the design does not
    /// instantiate. Returns the number of removed cells.
    pub fn remove_unused_cells_from_work_library(&mut self) -> Result<usize> {
        match self.library_by_name(WORK_LIBRARY) {
            Some(work) => self.remove_unused_cells_in(&[work]),
            None => Ok(0)
        }
    }

    /// Like [Netlist::remove_unused_cells_from_work_library], over
    /// every library but the primitives library.
    ///
    /// Fails if a used cell lives in a library that is not part of
    /// the netlist.
    pub fn remove_unused_cells_from_all_work_libraries(&mut self) -> Result<usize> {
        let libs = self.libraries.iter()
            .filter(|(k, _)| &***k != PRIMITIVES_LIBRARY)
            .map(|(_, &l)| l)
            .collect::<Vec<_>>();
        self.remove_unused_cells_in(&libs)
    }

    /// The library of this netlist matching library `lib` of
    /// `src`, created if missing.
    fn library_matching(&mut self, src: &Netlist, lib: LibraryId) -> Result<LibraryId> {
        let key = src.legal_name(EntityRef::Library(lib));
        if let Some(l) = self.library_by_name(&key) {
            return Ok(l)
        }
        match &*key == PRIMITIVES_LIBRARY {
            true => Ok(self.primitives_library()),
            false => self.add_library(name_obj_in(src, EntityRef::Library(lib)),
                                      src.library(lib).external)
        }
    }

    /// `<base>_parameterized<i>` with the first `i` free in `lib`.
    fn parameterized_name(&self, lib: LibraryId, base: &str) -> NameObj {
        let mut i = 0;
        loop {
            let name = format_compact!("{}_parameterized{}", base, i);
            if !self.library(lib).cells.contains_key(make_edif_compatible(&name).as_str()) {
                return legal_name_obj(&name)
            }
            i += 1;
        }
    }

    fn migrate_worker(&mut self, src: &mut Netlist, cell: CellId, uniquify: bool,
                      moved: &mut HashMap<CellId, CellId>) -> Result<CellId> {
        if let Some(&c) = moved.get(&cell) {
            return Ok(c)
        }
        let lib = self.library_matching(src, src.cell(cell).library)?;
        let mut name = name_obj_in(src, EntityRef::Cell(cell));
        let mut view = name_obj_in(src, EntityRef::CellView(cell));
        if let Some(&existing) = self.library(lib).cells.get(name.legal_name()) {
            if !uniquify || &*self.library(lib).name == PRIMITIVES_LIBRARY {
                moved.insert(cell, existing);
                return Ok(existing)
            }
            name = self.parameterized_name(lib, &src.cell(cell).name);
            view = name.clone();
            clilog::warn!(EDIF_COLLIDE, "cell {} collides in library {}, renamed to {}",
                          src.cell(cell).name, self.library(lib).name, name.name);
        }

        let new = self.add_cell(lib, name)?;
        moved.insert(cell, new);
        self.cells[new.index()].view = view.name.clone();
        self.set_rename_of(EntityRef::CellView(new), &view);
        self.cells[new.index()].properties = src.cell(cell).properties.clone();
        for &p in src.cell(cell).ports.values() {
            let port = src.port(p);
            let np = self.add_port(new, name_obj_in(src, EntityRef::Port(p)),
                                   port.direction, port.width)?;
            self.ports[np.index()].properties = port.properties.clone();
        }

        let insts = src.cell(cell).instances.values().copied().collect::<Vec<_>>();
        let mut new_insts = HashMap::with_capacity(insts.len());
        for i in insts {
            let ct = src.instance(i).cell_type;
            let ct = self.migrate_worker(src, ct, uniquify, moved)?;
            let ni = self.add_instance(new, name_obj_in(src, EntityRef::Instance(i)), ct)?;
            self.instances[ni.index()].properties = src.instance(i).properties.clone();
            new_insts.insert(i, ni);
        }
        for &n in src.cell(cell).nets.values() {
            let nn = self.add_net(new, name_obj_in(src, EntityRef::Net(n)))?;
            self.nets[nn.index()].properties = src.net(n).properties.clone();
            for &p in src.net(n).port_insts.values() {
                let pi = src.port_inst(p);
                let inst = match pi.instance {
                    Some(i) => match new_insts.get(&i) {
                        Some(&ni) => Some(ni),
                        None => return Err(unresolved("instance", &src.instance(i).name,
                                                      &src.net(n).name))
                    },
                    None => None
                };
                self.connect(nn, inst, &src.port(pi.port).bus_key(), pi.index)?;
            }
        }
        src.remove_cell(cell);
        Ok(new)
    }

    /// Move `cell` of `src` and every cell below it into this
    /// netlist's libraries, creating libraries as needed. The
    /// moved cells leave their libraries in `src`.
    ///
    /// A cell whose name is taken in the destination library is
    /// not moved, and the existing cell is used in its place.
    /// With `uniquify`, such a cell is moved under the first free
    /// name `<name>_parameterized<i>` instead, unless it is a
    /// primitive.
    ///
    /// Returns the cell standing for `cell` in this netlist.
    pub fn migrate_cell_and_sub_cells(&mut self, src: &mut Netlist, cell: CellId,
                                      uniquify: bool) -> Result<CellId> {
        let mut moved = HashMap::new();
        let ret = self.migrate_worker(src, cell, uniquify, &mut moved)?;
        clilog::debug!(EDIF_PRUNE, "migrated {} cells from {}", moved.len(), src.name);
        Ok(ret)
    }

    /// Give the netlist, the design and the top cell the name
    /// `new_name`.
    pub fn rename_netlist_and_top_cell(&mut self, new_name: &str) -> Result<()> {
        let top = self.top_cell()?;
        let lib = self.cell(top).library;
        let name = legal_name_obj(new_name);
        match self.library(lib).cells.get(name.legal_name()) {
            Some(&c) if c != top => {
                return Err(collision("cell", new_name, &self.library(lib).name))
            }
            _ => {}
        }
        let key = self.legal_name(EntityRef::Cell(top));
        let cells = &mut self.libs[lib.index()].cells;
        if let Some((idx, _, _)) = cells.shift_remove_full(&key) {
            cells.shift_insert(idx, name.legal_name().clone(), top);
        }
        self.cells[top.index()].name = name.name.clone();
        self.set_rename_of(EntityRef::Cell(top), &name);
        self.name = name.name.clone();
        self.set_rename_of(EntityRef::Netlist, &name);
        if let Some(d) = self.design.as_mut() {
            d.name = name.name.clone();
        }
        self.set_rename_of(EntityRef::Design, &name);
        self.reset_parent_net_map();
        Ok(())
    }
}
