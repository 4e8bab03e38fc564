//! Compact binary netlist format.
//!
//! Layout, all integers 4-byte big endian:
//! ```text
//! tag, version                         length-prefixed strings
//! string table                         count, strings
//! libraries                            count, per library:
//!   name record | EXTERNAL
//!   cells                              count, per cell:
//!     name record
//!     ports                            count | UNIQUE_VIEW [view name record],
//!                                      per port: name record, direction | width
//!     instances                        count, per instance:
//!       name record, cell ref          cell | SAME_LIBRARY | UNIQUE_VIEW,
//!                                      [library], [view name record]
//!     nets                             count, per net:
//!       name record, port refs         count, per ref: port name, bit, instance
//! netlist name record
//! comments                             count, strings
//! design                               library or NO_DESIGN, [cell, name record]
//! ```
//! A name record is a string index, with flags for a following
//! rename index and a following property block. A property is
//! `key | HAS_OWNER`, `kind << 30 | value`, `[owner]`.
//!
//! Decoding produces the same records the text parser does, and
//! builds the netlist from them.

use std::fs::File;
use std::io::{ BufReader, BufWriter, Read, Write };
use std::path::Path;
use byteorder::{ BigEndian, ReadBytesExt, WriteBytesExt };
use indexmap::IndexSet;
use edifparse::legal::LegalNameLookup;
use edifparse::{
    CellRec, CellRefRec, DesignRec, InstanceRec, LibraryRec,
    NetRec, PortRec, PortRefRec, PropertyRec,
};
use crate::*;

pub const BINARY_FORMAT_TAG: &str = "EDIFDB_BINARY_NETLIST";
pub const BINARY_FORMAT_VERSION: &str = "0.1.0";

const FLAG_PROPERTIES: u32 = 1 << 31;
const FLAG_RENAME: u32 = 1 << 30;
const FLAG_EXTERNAL: u32 = 1 << 29;
const NAME_INDEX_MASK: u32 = FLAG_EXTERNAL - 1;

const FLAG_OWNER: u32 = 1 << 31;
const VALUE_INDEX_MASK: u32 = (1 << 30) - 1;

const FLAG_UNIQUE_VIEW_COUNT: u32 = 1 << 31;

const FLAG_SAME_LIBRARY: u32 = 1 << 31;
const FLAG_UNIQUE_VIEW_REF: u32 = 1 << 30;
const CELL_INDEX_MASK: u32 = FLAG_UNIQUE_VIEW_REF - 1;

const PORT_INPUT: u32 = 1 << 31;
const PORT_OUTPUT: u32 = 1 << 30;
const PORT_INOUT: u32 = 1 << 29;
const PORT_WIDTH_MASK: u32 = PORT_INOUT - 1;

const NO_INSTANCE: u32 = u32::MAX;
const NO_BIT: u32 = u32::MAX;
const NO_DESIGN: u32 = u32::MAX;

fn corrupt(msg: impl Into<String>) -> EdifError {
    let msg = msg.into();
    clilog::error!(EDIF_BIN_VER, "corrupt binary netlist: {}", msg);
    EdifError::BinaryFormat(msg)
}

struct Encoder<'a> {
    netlist: &'a Netlist,
    strings: IndexSet<Ident>,
    buf: Vec<u8>,
}

impl<'a> Encoder<'a> {
    fn string(&mut self, s: &Ident) -> Result<u32> {
        let (i, _) = self.strings.insert_full(s.clone());
        if i as u32 > NAME_INDEX_MASK {
            return Err(corrupt("too many distinct strings"))
        }
        Ok(i as u32)
    }

    #[inline]
    fn u32(&mut self, v: u32) -> Result<()> {
        Ok(self.buf.write_u32::<BigEndian>(v)?)
    }

    fn name(&mut self, e: EntityRef, flags: u32,
            props: Option<&'a Properties>) -> Result<()> {
        let nl = self.netlist;
        let mut word = self.string(&nl.name_of(e))? | flags;
        let rename = nl.renames.rename_of(&e);
        if rename.is_some() {
            word |= FLAG_RENAME;
        }
        let props = props.filter(|p| !p.is_empty());
        if props.is_some() {
            word |= FLAG_PROPERTIES;
        }
        self.u32(word)?;
        if let Some(r) = rename {
            let r = self.string(&r)?;
            self.u32(r)?;
        }
        if let Some(props) = props {
            self.u32(props.len() as u32)?;
            for (key, value) in props {
                let k = self.string(key)?;
                let v = self.string(&value.value)?;
                if v > VALUE_INDEX_MASK {
                    return Err(corrupt("too many distinct strings"))
                }
                match &value.owner {
                    Some(owner) => {
                        let o = self.string(owner)?;
                        self.u32(k | FLAG_OWNER)?;
                        self.u32(value.kind.code() << 30 | v)?;
                        self.u32(o)?;
                    }
                    None => {
                        self.u32(k)?;
                        self.u32(value.kind.code() << 30 | v)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `(library index, cell index)` of a cell.
    fn cell_ref(&self, cell: CellId) -> Result<(u32, u32)> {
        let nl = self.netlist;
        let c = nl.cell(cell);
        let key = nl.legal_name(EntityRef::Cell(cell));
        let lib_key = nl.legal_name(EntityRef::Library(c.library));
        let lib = nl.libraries.get_index_of(&lib_key);
        let idx = nl.library(c.library).cells.get_index_of(&key);
        match (lib, idx) {
            (Some(l), Some(i)) => Ok((l as u32, i as u32)),
            _ => Err(EdifError::UnresolvedReference {
                kind: "cell",
                name: builder::cell_path(nl, cell),
                context: "binary netlist".into()
            })
        }
    }

    fn port_word(&self, port: &Port) -> Result<u32> {
        if port.width > PORT_WIDTH_MASK {
            clilog::error!(EDIF_BIN_VER, "port {} is too wide ({}) for the binary format",
                           port.name, port.width);
            return Err(EdifError::PortWidthOverflow {
                port: (&*port.name).into(),
                width: port.width
            })
        }
        Ok(port.width | match port.direction {
            PortDirection::Input => PORT_INPUT,
            PortDirection::Output => PORT_OUTPUT,
            PortDirection::InOut => PORT_INOUT,
        })
    }

    fn cell(&mut self, id: CellId) -> Result<()> {
        let nl = self.netlist;
        let cell = nl.cell(id);
        self.name(EntityRef::Cell(id), 0, Some(&cell.properties))?;

        let unique_view = &*cell.view != DEFAULT_VIEW ||
            nl.renames.rename_of(&EntityRef::CellView(id)).is_some();
        self.u32(cell.ports.len() as u32 |
                 if unique_view { FLAG_UNIQUE_VIEW_COUNT } else { 0 })?;
        if unique_view {
            self.name(EntityRef::CellView(id), 0, None)?;
        }
        for &p in cell.ports.values() {
            self.name(EntityRef::Port(p), 0, Some(&nl.port(p).properties))?;
            let word = self.port_word(nl.port(p))?;
            self.u32(word)?;
        }

        self.u32(cell.instances.len() as u32)?;
        for &i in cell.instances.values() {
            let inst = nl.instance(i);
            self.name(EntityRef::Instance(i), 0, Some(&inst.properties))?;
            let (lib, idx) = self.cell_ref(inst.cell_type)?;
            let same_lib = nl.cell(inst.cell_type).library == cell.library;
            let unique_view = inst.view != nl.cell(inst.cell_type).view ||
                nl.renames.rename_of(&EntityRef::InstanceView(i)).is_some();
            let mut word = idx;
            if same_lib {
                word |= FLAG_SAME_LIBRARY;
            }
            if unique_view {
                word |= FLAG_UNIQUE_VIEW_REF;
            }
            self.u32(word)?;
            if !same_lib {
                self.u32(lib)?;
            }
            if unique_view {
                self.name(EntityRef::InstanceView(i), 0, None)?;
            }
        }

        self.u32(cell.nets.len() as u32)?;
        for &n in cell.nets.values() {
            let net = nl.net(n);
            self.name(EntityRef::Net(n), 0, Some(&net.properties))?;
            self.u32(net.port_insts.len() as u32)?;
            for &p in net.port_insts.values() {
                let pi = nl.port_inst(p);
                let port_name = nl.legal_name(EntityRef::Port(pi.port));
                let s = self.string(&port_name)?;
                self.u32(s)?;
                self.u32(match pi.index {
                    i if i < 0 => NO_BIT,
                    i => i as u32
                })?;
                let inst = match pi.instance {
                    Some(i) => cell.instances.get_index_of(&nl.instance(i).name)
                        .map(|x| x as u32)
                        .ok_or_else(|| corrupt("pin of an instance outside its cell"))?,
                    None => NO_INSTANCE
                };
                self.u32(inst)?;
            }
        }
        Ok(())
    }

    fn netlist(&mut self) -> Result<()> {
        let nl = self.netlist;
        self.u32(nl.libraries.len() as u32)?;
        for &l in nl.libraries.values() {
            let lib = nl.library(l);
            self.name(EntityRef::Library(l), if lib.external { FLAG_EXTERNAL } else { 0 }, None)?;
            self.u32(lib.cells.len() as u32)?;
            for &c in lib.cells.values() {
                self.cell(c)?;
            }
        }
        self.name(EntityRef::Netlist, 0, None)?;
        self.u32(nl.comments.len() as u32)?;
        for c in &nl.comments {
            write_string(&mut self.buf, c)?;
        }
        match &nl.design {
            Some(d) => {
                let (lib, idx) = self.cell_ref(d.top)?;
                self.u32(lib)?;
                self.u32(idx)?;
                self.name(EntityRef::Design, 0, Some(&d.properties))?;
            }
            None => self.u32(NO_DESIGN)?
        }
        Ok(())
    }
}

fn write_string(w: &mut impl Write, s: &str) -> Result<()> {
    w.write_u32::<BigEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

struct Decoder<R> {
    r: R,
    strings: Vec<Ident>,
}

/// A name record with its flag bits.
struct NameRec {
    name: NameObj,
    properties: Vec<PropertyRec>,
    flags: u32,
}

impl<R: Read> Decoder<R> {
    fn u32(&mut self) -> Result<u32> {
        self.r.read_u32::<BigEndian>().map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => corrupt("unexpected end of data"),
            _ => EdifError::Io(e)
        })
    }

    fn raw_string(&mut self) -> Result<Ident> {
        let len = self.u32()? as u64;
        let mut buf = Vec::new();
        (&mut self.r).take(len).read_to_end(&mut buf)?;
        if buf.len() as u64 != len {
            return Err(corrupt("unexpected end of data"))
        }
        match String::from_utf8(buf) {
            Ok(s) => Ok(s.into()),
            Err(_) => Err(corrupt("string is not valid utf-8"))
        }
    }

    fn string(&self, idx: u32) -> Result<Ident> {
        self.strings.get(idx as usize).cloned()
            .ok_or_else(|| corrupt(format!("string index {} out of range", idx)))
    }

    fn name(&mut self) -> Result<NameRec> {
        let word = self.u32()?;
        let name = self.string(word & NAME_INDEX_MASK)?;
        let rename = match word & FLAG_RENAME {
            0 => None,
            _ => {
                let r = self.u32()?;
                Some(self.string(r)?)
            }
        };
        let mut properties = Vec::new();
        if word & FLAG_PROPERTIES != 0 {
            let n = self.u32()?;
            for _ in 0..n {
                let k = self.u32()?;
                let v = self.u32()?;
                let kind = PropertyKind::from_code(v >> 30)
                    .ok_or_else(|| corrupt(format!("bad property type {}", v >> 30)))?;
                let mut value = PropertyValue::new(kind, self.string(v & VALUE_INDEX_MASK)?);
                if k & FLAG_OWNER != 0 {
                    let o = self.u32()?;
                    value = value.with_owner(self.string(o)?);
                }
                properties.push(PropertyRec {
                    name: NameObj::new(self.string(k & !FLAG_OWNER)?),
                    value
                });
            }
        }
        Ok(NameRec {
            name: NameObj { name, rename },
            properties,
            flags: word & !(NAME_INDEX_MASK | FLAG_RENAME | FLAG_PROPERTIES),
        })
    }

    fn port(&mut self) -> Result<PortRec> {
        let NameRec { name, properties, .. } = self.name()?;
        let word = self.u32()?;
        let direction = match word & !PORT_WIDTH_MASK {
            PORT_INPUT => PortDirection::Input,
            PORT_OUTPUT => PortDirection::Output,
            PORT_INOUT => PortDirection::InOut,
            d => return Err(corrupt(format!("bad port direction bits {:#x}", d)))
        };
        Ok(PortRec { name, width: word & PORT_WIDTH_MASK, direction, properties })
    }
}

/// An instance whose cell is referenced by position.
struct PendingRef {
    lib: usize,
    cell: usize,
    inst: usize,
    target: (usize, usize),
    default_view: bool,
}

fn decode_file(r: impl Read) -> Result<EdifFile> {
    let mut d = Decoder { r, strings: Vec::new() };
    for expected in [BINARY_FORMAT_TAG, BINARY_FORMAT_VERSION] {
        let found = d.raw_string()?;
        if &*found != expected {
            clilog::error!(EDIF_BIN_VER, "binary netlist format mismatch: \
                                          expected {:?}, found {:?}", expected, found);
            return Err(EdifError::BinaryFormatMismatch {
                expected: expected.into(),
                found: found.to_string()
            })
        }
    }
    let n_strings = d.u32()?;
    d.strings.reserve(n_strings.min(1 << 20) as usize);
    for _ in 0..n_strings {
        let s = d.raw_string()?;
        d.strings.push(s);
    }

    let mut libraries = Vec::new();
    let mut pending = Vec::new();
    let n_libs = d.u32()?;
    for li in 0..n_libs as usize {
        let lib = d.name()?;
        let n_cells = d.u32()?;
        let mut cells = Vec::new();
        for ci in 0..n_cells as usize {
            let NameRec { name, properties, .. } = d.name()?;
            let word = d.u32()?;
            let view = match word & FLAG_UNIQUE_VIEW_COUNT {
                0 => NameObj::new(DEFAULT_VIEW.into()),
                _ => d.name()?.name
            };
            let ports = (0..word & !FLAG_UNIQUE_VIEW_COUNT)
                .map(|_| d.port())
                .collect::<Result<Vec<_>>>()?;

            let n_insts = d.u32()?;
            let mut instances = Vec::new();
            for ii in 0..n_insts as usize {
                let inst = d.name()?;
                let word = d.u32()?;
                let target_lib = match word & FLAG_SAME_LIBRARY {
                    0 => d.u32()? as usize,
                    _ => li
                };
                let view = match word & FLAG_UNIQUE_VIEW_REF {
                    0 => None,
                    _ => Some(d.name()?.name)
                };
                pending.push(PendingRef {
                    lib: li, cell: ci, inst: ii,
                    target: (target_lib, (word & CELL_INDEX_MASK) as usize),
                    default_view: view.is_none(),
                });
                instances.push(InstanceRec {
                    name: inst.name,
                    view: view.unwrap_or_else(|| NameObj::new(DEFAULT_VIEW.into())),
                    cell_ref: CellRefRec { cell: "".into(), library: None },
                    properties: inst.properties,
                    offset: 0,
                });
            }

            let n_nets = d.u32()?;
            let mut nets = Vec::new();
            for _ in 0..n_nets {
                let net = d.name()?;
                let n_refs = d.u32()?;
                let mut joined = Vec::new();
                for _ in 0..n_refs {
                    let port = d.u32()?;
                    let port = d.string(port)?;
                    let bit = d.u32()?;
                    let inst = d.u32()?;
                    let instance = match inst {
                        NO_INSTANCE => None,
                        i => Some(instances.get(i as usize)
                                  .map(|r: &InstanceRec| r.name.legal_name().clone())
                                  .ok_or_else(|| corrupt(format!(
                                      "instance index {} out of range", i)))?)
                    };
                    joined.push(PortRefRec {
                        port,
                        member: match bit { NO_BIT => None, b => Some(b) },
                        instance,
                        offset: 0,
                    });
                }
                nets.push(NetRec { name: net.name, joined, properties: net.properties });
            }
            cells.push(CellRec {
                name, view, ports, instances, nets, properties,
                offset: 0,
            });
        }
        libraries.push(LibraryRec {
            name: lib.name,
            external: lib.flags & FLAG_EXTERNAL != 0,
            cells,
            offset: 0,
        });
    }

    let name = d.name()?.name;
    let n_comments = d.u32()?;
    let comments = (0..n_comments).map(|_| d.raw_string()).collect::<Result<Vec<_>>>()?;

    let lookup = |libraries: &[LibraryRec], (l, c): (usize, usize)| -> Result<CellRefRec> {
        let lib = libraries.get(l)
            .ok_or_else(|| corrupt(format!("library index {} out of range", l)))?;
        let cell = lib.cells.get(c)
            .ok_or_else(|| corrupt(format!("cell index {} out of range", c)))?;
        Ok(CellRefRec {
            cell: cell.name.legal_name().clone(),
            library: Some(lib.name.legal_name().clone())
        })
    };
    for p in pending {
        let cell_ref = lookup(libraries.as_slice(), p.target)?;
        let view = libraries[p.target.0].cells[p.target.1].view.clone();
        let inst = &mut libraries[p.lib].cells[p.cell].instances[p.inst];
        inst.cell_ref = cell_ref;
        if p.default_view {
            inst.view = view;
        }
    }

    let design = match d.u32()? {
        NO_DESIGN => None,
        l => {
            let c = d.u32()?;
            let cell_ref = lookup(libraries.as_slice(), (l as usize, c as usize))?;
            let NameRec { name, properties, .. } = d.name()?;
            Some(DesignRec { name, cell_ref, properties })
        }
    };

    Ok(EdifFile { name, status: None, libraries, comments, design })
}

impl Netlist {
    /// Write the binary form to `w`.
    pub fn encode(&self, mut w: impl Write) -> Result<()> {
        let timer = clilog::stimer!("encode binary netlist");
        let mut enc = Encoder { netlist: self, strings: IndexSet::new(), buf: Vec::new() };
        enc.netlist()?;
        write_string(&mut w, BINARY_FORMAT_TAG)?;
        write_string(&mut w, BINARY_FORMAT_VERSION)?;
        w.write_u32::<BigEndian>(enc.strings.len() as u32)?;
        for s in &enc.strings {
            write_string(&mut w, s)?;
        }
        w.write_all(&enc.buf)?;
        w.flush()?;
        clilog::finish!(timer);
        Ok(())
    }

    /// Read a netlist written by [Netlist::encode].
    pub fn decode(r: impl Read) -> Result<Netlist> {
        let timer = clilog::stimer!("decode binary netlist");
        let file = decode_file(r)?;
        clilog::finish!(timer);
        Netlist::from_edif(&file)
    }

    /// [Netlist::encode] into a gzip-compressed file.
    pub fn write_binary_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let f = BufWriter::new(File::create(path)?);
        let mut gz = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        self.encode(&mut gz)?;
        gz.finish()?.flush()?;
        Ok(())
    }

    /// [Netlist::decode] from a gzip-compressed file.
    pub fn read_binary_file(path: impl AsRef<Path>) -> Result<Netlist> {
        let f = BufReader::new(File::open(path)?);
        Netlist::decode(flate2::read::GzDecoder::new(f))
    }
}
