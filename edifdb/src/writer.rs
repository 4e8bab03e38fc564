//! EDIF text writer.

use std::borrow::Cow;
use std::collections::{ HashMap, HashSet };
use std::fs::File;
use std::io::{ BufWriter, Write };
use std::path::Path;
use compact_str::CompactString;
use edifparse::legal::{ LegalNameLookup, WriteLegalNameCache };
use crate::*;

/// Options of [Netlist::export_edif].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterConfig {
    /// Sort libraries, cells, instances, nets and pins by name
    /// instead of keeping insertion order.
    pub stable: bool,
}

struct EdifWriter<'a, W: Write> {
    netlist: &'a Netlist,
    config: &'a WriterConfig,
    names: WriteLegalNameCache,
    w: W,
}

/// `(rename legal "name")`, or the bare name.
fn name_obj(name: &str, rename: Option<&str>) -> String {
    match rename {
        Some(r) => format!("(rename {} \"{}\")", r, name),
        None => name.to_string()
    }
}

fn sorted<'i, K: Ord + ?Sized + 'i, V: Copy + 'i>(
    stable: bool, it: impl Iterator<Item = (&'i K, &'i V)>
) -> Vec<V> {
    let mut v = it.collect::<Vec<_>>();
    if stable {
        v.sort_by(|a, b| a.0.cmp(b.0));
    }
    v.into_iter().map(|(_, &x)| x).collect()
}

impl<'a, W: Write> EdifWriter<'a, W> {
    /// The rename to write for an object: the one read from the
    /// source, or a generated one for illegal names.
    fn rename_of(&self, e: EntityRef) -> Option<CompactString> {
        match self.netlist.renames.rename_of(&e) {
            Some(r) => Some((&*r).into()),
            None => self.names.get_rename(&self.netlist.name_of(e))
        }
    }

    fn legal(&self, e: EntityRef) -> CompactString {
        self.rename_of(e).unwrap_or_else(|| (&*self.netlist.name_of(e)).into())
    }

    fn entity(&self, e: EntityRef) -> String {
        let name = self.netlist.name_of(e);
        name_obj(&name, self.rename_of(e).as_deref())
    }

    /// The legal name of a port, as used in port-refs.
    fn port_legal(&self, p: PortId) -> CompactString {
        let nl = self.netlist;
        let port = nl.port(p);
        let legal = self.legal(EntityRef::Port(p));
        if port.is_bus() && nl.renames.rename_of(&EntityRef::Port(p)).is_none() {
            let cell = nl.cell(port.cell);
            if let Some(&other) = cell.ports.get(legal.as_str()) {
                if other != p {
                    return self.names.bus_collision_rename(&port.name)
                }
            }
        }
        legal
    }

    fn property_key(&self, key: &str) -> String {
        name_obj(key, self.names.get_rename(key).as_deref())
    }

    fn properties(&mut self, props: &Properties, indent: usize) -> Result<()> {
        let mut keys = props.keys().collect::<Vec<_>>();
        if self.config.stable {
            keys.sort();
        }
        for key in keys {
            let value = &props[key];
            let owner: Cow<str> = match &value.owner {
                Some(o) => format!(" (owner \"{}\")", o).into(),
                None => "".into()
            };
            writeln!(self.w, "{:indent$}(property {} {}{})", "",
                     self.property_key(key), value, owner, indent = indent)?;
        }
        Ok(())
    }

    fn cell(&mut self, id: CellId) -> Result<()> {
        let nl = self.netlist;
        let cell = nl.cell(id);
        let stable = self.config.stable;
        writeln!(self.w, "    (cell {} (celltype GENERIC)", self.entity(EntityRef::Cell(id)))?;
        writeln!(self.w, "      (view {} (viewtype NETLIST)", self.entity(EntityRef::CellView(id)))?;
        writeln!(self.w, "        (interface")?;
        for p in sorted(stable, cell.ports.iter().map(|(k, v)| (&**k, v))) {
            let port = nl.port(p);
            let legal = self.port_legal(p);
            let name = match port.is_bus() || legal.as_str() != &*port.name {
                true => name_obj(&port.name, Some(&legal)),
                false => legal.to_string()
            };
            let name = match port.is_bus() {
                true => format!("(array {} {})", name, port.width),
                false => name
            };
            match port.properties.is_empty() {
                true => writeln!(self.w, "          (port {} (direction {}))", name,
                                 port.direction.keyword())?,
                false => {
                    writeln!(self.w, "          (port {} (direction {})", name,
                             port.direction.keyword())?;
                    self.properties(&port.properties, 12)?;
                    writeln!(self.w, "          )")?;
                }
            }
        }
        writeln!(self.w, "        )")?;

        if !cell.instances.is_empty() || !cell.nets.is_empty() {
            writeln!(self.w, "        (contents")?;
            for i in sorted(stable, cell.instances.iter().map(|(k, v)| (&**k, v))) {
                let inst = nl.instance(i);
                let ct = inst.cell_type;
                let lib = nl.cell(ct).library;
                writeln!(self.w, "          (instance {}", self.entity(EntityRef::Instance(i)))?;
                writeln!(self.w, "            (viewref {} (cellref {} (libraryref {})))",
                         self.entity(EntityRef::InstanceView(i)),
                         self.legal(EntityRef::Cell(ct)),
                         self.legal(EntityRef::Library(lib)))?;
                self.properties(&inst.properties, 12)?;
                writeln!(self.w, "          )")?;
            }
            for n in sorted(stable, cell.nets.iter().map(|(k, v)| (&**k, v))) {
                let net = nl.net(n);
                writeln!(self.w, "          (net {}", self.entity(EntityRef::Net(n)))?;
                writeln!(self.w, "            (joined")?;
                for p in sorted(stable, net.port_insts.iter().map(|(k, v)| (&**k, v))) {
                    let pi = nl.port_inst(p);
                    let port = self.port_legal(pi.port);
                    let port = match pi.index {
                        i if i >= 0 && nl.port(pi.port).is_bus() => {
                            format!("(member {} {})", port, i)
                        }
                        _ => port.to_string()
                    };
                    match pi.instance {
                        Some(i) => writeln!(
                            self.w, "              (portref {} (instanceref {}))",
                            port, self.legal(EntityRef::Instance(i)))?,
                        None => writeln!(self.w, "              (portref {})", port)?
                    }
                }
                writeln!(self.w, "            )")?;
                self.properties(&net.properties, 12)?;
                writeln!(self.w, "          )")?;
            }
            writeln!(self.w, "        )")?;
        }
        self.properties(&cell.properties, 8)?;
        writeln!(self.w, "      )")?;
        writeln!(self.w, "    )")?;
        Ok(())
    }

    fn status(&mut self, status: &StatusRec) -> Result<()> {
        let t = &status.timestamp;
        writeln!(self.w, "  (status")?;
        writeln!(self.w, "    (written")?;
        writeln!(self.w, "      (timeStamp {} {} {} {} {} {})",
                 t[0], t[1], t[2], t[3], t[4], t[5])?;
        writeln!(self.w, "      (program \"{}\" (version \"{}\"))",
                 status.program.as_deref().unwrap_or(""),
                 status.version.as_deref().unwrap_or(""))?;
        for c in &status.comments {
            writeln!(self.w, "      (comment \"{}\")", c)?;
        }
        for (k, v) in &status.metax {
            writeln!(self.w, "      (metax {} {})", k, v)?;
        }
        let props = builder::properties_of(&status.properties);
        self.properties(&props, 6)?;
        writeln!(self.w, "    )")?;
        writeln!(self.w, "  )")?;
        Ok(())
    }

    fn write(&mut self) -> Result<()> {
        let nl = self.netlist;
        writeln!(self.w, "(edif {}", self.entity(EntityRef::Netlist))?;
        writeln!(self.w, "  (edifversion 2 0 0)")?;
        writeln!(self.w, "  (edifLevel 0)")?;
        writeln!(self.w, "  (keywordmap (keywordlevel 0))")?;
        if let Some(s) = &nl.status {
            self.status(s)?;
        }
        for c in &nl.comments {
            writeln!(self.w, "  (comment \"{}\")", c)?;
        }
        for l in nl.libraries_in_export_order(self.config.stable)? {
            let lib = nl.library(l);
            writeln!(self.w, "  ({} {}", match lib.external {
                true => "external",
                false => "Library"
            }, self.entity(EntityRef::Library(l)))?;
            writeln!(self.w, "    (edifLevel 0)")?;
            writeln!(self.w, "    (technology (numberDefinition ))")?;
            for c in sorted(self.config.stable, lib.cells.iter().map(|(k, v)| (&**k, v))) {
                self.cell(c)?;
            }
            writeln!(self.w, "  )")?;
        }
        if let Some(d) = &nl.design {
            let lib = nl.cell(d.top).library;
            writeln!(self.w, "  (design {}", self.entity(EntityRef::Design))?;
            writeln!(self.w, "    (cellref {} (libraryref {}))",
                     self.legal(EntityRef::Cell(d.top)),
                     self.legal(EntityRef::Library(lib)))?;
            self.properties(&d.properties, 4)?;
            writeln!(self.w, "  )")?;
        }
        writeln!(self.w, ")")?;
        self.w.flush()?;
        Ok(())
    }
}

impl Netlist {
    /// Libraries in an order where every library comes after the
    /// libraries its cells instantiate from, with the primitives
    /// library first.
    ///
    /// Fails with [EdifError::CircularLibraries] if two libraries
    /// depend on each other.
    pub fn libraries_in_export_order(&self, stable: bool) -> Result<Vec<LibraryId>> {
        let mut pending = sorted(stable, self.libraries.iter().map(|(k, v)| (&**k, v)));
        if let Some(pos) = pending.iter().position(|&l| &*self.library(l).name == PRIMITIVES_LIBRARY) {
            let prims = pending.remove(pos);
            pending.insert(0, prims);
        }
        let deps = pending.iter().map(|&l| {
            let mut d = self.library(l).cells.values()
                .flat_map(|&c| self.cell(c).instances.values())
                .map(|&i| self.cell(self.instance(i).cell_type).library)
                .filter(|&dl| dl != l)
                .collect::<Vec<_>>();
            d.sort_unstable();
            d.dedup();
            (l, d)
        }).collect::<HashMap<_, _>>();

        let mut order = Vec::with_capacity(pending.len());
        let mut emitted = HashSet::new();
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|&l| {
                // libraries outside the netlist map cannot be waited for.
                let ready = deps[&l].iter().all(|d| {
                    emitted.contains(d) || !deps.contains_key(d)
                });
                if ready {
                    order.push(l);
                    emitted.insert(l);
                }
                !ready
            });
            if pending.len() == before {
                let libraries = pending.iter()
                    .map(|&l| &*self.library(l).name)
                    .collect::<Vec<_>>()
                    .join(", ");
                clilog::error!(EDIF_REF, "circular dependency between libraries {}", libraries);
                return Err(EdifError::CircularLibraries { libraries: libraries.into() })
            }
        }
        Ok(order)
    }

    /// Write the netlist as EDIF text.
    pub fn export_edif(&self, w: impl Write, config: &WriterConfig) -> Result<()> {
        let timer = clilog::stimer!("export edif");
        EdifWriter {
            netlist: self,
            config,
            names: WriteLegalNameCache::new(),
            w,
        }.write()?;
        clilog::finish!(timer);
        Ok(())
    }

    /// [Netlist::export_edif] into a file, gzip-compressed if
    /// the path ends in `.gz`.
    pub fn write_edif_file(&self, path: impl AsRef<Path>, config: &WriterConfig) -> Result<()> {
        let path = path.as_ref();
        let f = BufWriter::new(File::create(path)?);
        if path.extension().map_or(false, |e| e == "gz") {
            let mut gz = flate2::write::GzEncoder::new(f, flate2::Compression::default());
            self.export_edif(&mut gz, config)?;
            gz.finish()?.flush()?;
        }
        else {
            self.export_edif(f, config)?;
        }
        Ok(())
    }
}
