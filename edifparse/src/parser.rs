//! Recursive-descent parser over a token stream.
//!
//! The parser is shared by the sequential path and the parallel
//! workers: both drive it through [EdifParser::parse_head],
//! [EdifParser::parse_to_next_cell] and [EdifParser::parse_cell].

use std::collections::HashSet;
use compact_str::CompactString;
use crate::*;
use crate::tokenizer::{ Token, TokenSource };

/// Something found at the top level of the file that has
/// to be merged in byte order.
#[derive(Debug)]
pub(crate) enum ParsedItem {
    /// A library head. Its cells follow as separate items.
    Library(LibraryRec),
    Cell(CellRec),
}

impl ParsedItem {
    pub(crate) fn offset(&self) -> u64 {
        match self {
            ParsedItem::Library(l) => l.offset,
            ParsedItem::Cell(c) => c.offset,
        }
    }
}

/// Everything a parser instance collected so far.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub(crate) name: Option<NameObj>,
    pub(crate) items: Vec<ParsedItem>,
    pub(crate) status: Option<StatusRec>,
    pub(crate) comments: Vec<Ident>,
    pub(crate) design: Option<DesignRec>,
}

impl Collected {
    /// Assembles the file from one or more collections, given in
    /// byte order of their ranges.
    pub(crate) fn merge(parts: impl IntoIterator<Item = Collected>) -> Result<EdifFile> {
        let mut name = None;
        let mut status = None;
        let mut comments = Vec::new();
        let mut design = None;
        let mut libraries: Vec<LibraryRec> = Vec::new();
        let mut last_offset = None;
        for part in parts {
            if name.is_none() {
                name = part.name;
            }
            if status.is_none() {
                status = part.status;
            }
            comments.extend(part.comments);
            if part.design.is_some() {
                design = part.design;
            }
            for item in part.items {
                let offset = item.offset();
                if let Some(previous) = last_offset {
                    if offset <= previous {
                        clilog::error!(EDIF_PARSE, "parse results out of order: {} after {}",
                                       offset, previous);
                        return Err(EdifParseError::WorkerOrder { previous, offset })
                    }
                }
                last_offset = Some(offset);
                match item {
                    ParsedItem::Library(lib) => libraries.push(lib),
                    ParsedItem::Cell(cell) => match libraries.last_mut() {
                        Some(lib) => lib.cells.push(cell),
                        None => return Err(EdifParseError::UnexpectedToken {
                            expected: "library".into(),
                            found: "cell".into(),
                            offset
                        })
                    }
                }
            }
        }
        let name = name.ok_or(EdifParseError::UnexpectedEof { offset: 0 })?;
        Ok(EdifFile { name, status, libraries, comments, design })
    }
}

/// Recursive-descent EDIF parser.
pub struct EdifParser<T> {
    tok: T,
    /// inside a `(library ...)` form.
    in_library: bool,
    pub(crate) out: Collected,
}

#[inline]
fn unexpected(expected: &str, found: &Token) -> EdifParseError {
    EdifParseError::UnexpectedToken {
        expected: expected.into(),
        found: CompactString::from(found.text.as_ref()),
        offset: found.offset,
    }
}

impl<T: TokenSource> EdifParser<T> {
    pub fn new(tok: T) -> EdifParser<T> {
        EdifParser { tok, in_library: false, out: Collected::default() }
    }

    pub(crate) fn tokenizer_mut(&mut self) -> &mut T {
        &mut self.tok
    }

    pub(crate) fn set_in_library(&mut self, v: bool) {
        self.in_library = v;
    }

    /// Parses a complete file from the current position.
    pub fn parse_all(mut self) -> Result<EdifFile> {
        self.parse_head()?;
        while self.parse_to_next_cell()? {
            let first = self.next(false)?;
            self.parse_cell(first)?;
        }
        Collected::merge([self.out])
    }

    pub(crate) fn next_opt(&mut self, short_lived: bool) -> Result<Option<Token>> {
        self.tok.next_token(short_lived)
    }

    #[inline]
    pub(crate) fn next(&mut self, short_lived: bool) -> Result<Token> {
        match self.tok.next_token(short_lived)? {
            Some(t) => Ok(t),
            None => Err(EdifParseError::UnexpectedEof { offset: self.tok.byte_offset() })
        }
    }

    #[inline]
    fn expect_token(expected: &str, t: &Token) -> Result<()> {
        if t.is(expected) {
            Ok(())
        }
        else {
            Err(unexpected(expected, t))
        }
    }

    #[inline]
    fn expect(&mut self, expected: &str) -> Result<Token> {
        let t = self.next(true)?;
        Self::expect_token(expected, &t)?;
        Ok(t)
    }

    fn parse_u32(&mut self) -> Result<u32> {
        let t = self.next(true)?;
        t.text.parse().map_err(|_| EdifParseError::InvalidNumber {
            token: CompactString::from(t.text.as_ref()),
            offset: t.offset
        })
    }

    /// `(edif name (edifversion 2 0 0) (ediflevel 0) (keywordmap (keywordlevel 0))`
    pub fn parse_head(&mut self) -> Result<()> {
        self.expect("(")?;
        self.expect("edif")?;
        let name = self.parse_name_obj()?;
        for kw in ["(", "edifversion", "2", "0", "0", ")",
                   "(", "ediflevel", "0", ")",
                   "(", "keywordmap", "(", "keywordlevel", "0", ")", ")"] {
            self.expect(kw)?;
        }
        self.out.name = Some(name);
        Ok(())
    }

    /// A name object whose first token was already read.
    fn parse_name_obj_from(&mut self, first: Token) -> Result<NameObj> {
        if &*first.text != "(" {
            return Ok(NameObj::new(first.text))
        }
        self.expect("rename")?;
        let rename = self.next(false)?.text;
        let mut name = self.next(false)?.text;
        if let Some(stripped) = name.strip_prefix("[]") {
            name = self.tok.intern(stripped);
        }
        self.expect(")")?;
        Ok(NameObj::renamed(name, rename))
    }

    fn parse_name_obj(&mut self) -> Result<NameObj> {
        let first = self.next(false)?;
        self.parse_name_obj_from(first)
    }

    /// `(type value)`, with booleans as `(boolean (true))`.
    fn parse_property_value(&mut self) -> Result<PropertyValue> {
        self.expect("(")?;
        let t = self.next(true)?;
        let kind = PropertyKind::from_keyword(&t.text)
            .ok_or_else(|| unexpected("string | integer | boolean", &t))?;
        let value = match kind {
            PropertyKind::Boolean => {
                self.expect("(")?;
                let v = self.next(false)?.text;
                self.expect(")")?;
                v
            }
            _ => self.next(false)?.text
        };
        self.expect(")")?;
        Ok(PropertyValue::new(kind, value))
    }

    /// after `(property`.
    fn parse_property(&mut self) -> Result<PropertyRec> {
        let name = self.parse_name_obj()?;
        let mut value = self.parse_property_value()?;
        let t = self.next(true)?;
        match &*t.text {
            ")" => {}
            "(" => {
                self.expect("owner")?;
                value.owner = Some(self.next(false)?.text);
                self.expect(")")?;
                self.expect(")")?;
            }
            _ => return Err(unexpected(") | (", &t))
        }
        Ok(PropertyRec { name, value })
    }

    /// a sequence of `(property ...)` forms terminated by `)`.
    fn parse_properties_until_close(&mut self) -> Result<Vec<PropertyRec>> {
        let mut props = Vec::new();
        loop {
            let t = self.next(true)?;
            match &*t.text {
                ")" => return Ok(props),
                "(" => {
                    self.expect("property")?;
                    props.push(self.parse_property()?);
                }
                _ => return Err(unexpected(")", &t))
            }
        }
    }

    /// after `(port`.
    fn parse_port(&mut self) -> Result<PortRec> {
        let first = self.next(false)?;
        let (name, width) = if &*first.text == "(" {
            let t = self.next(true)?;
            if t.is("array") {
                let name = self.parse_name_obj()?;
                let width = self.parse_u32()?;
                self.expect(")")?;
                (name, width)
            }
            else if t.is("rename") {
                let rename = self.next(false)?.text;
                let name = self.next(false)?.text;
                self.expect(")")?;
                (NameObj::renamed(name, rename), 1)
            }
            else {
                return Err(unexpected("array | rename", &t))
            }
        }
        else {
            (NameObj::new(first.text), 1)
        };
        self.expect("(")?;
        self.expect("direction")?;
        let t = self.next(true)?;
        let direction = PortDirection::from_keyword(&t.text)
            .ok_or_else(|| unexpected("INPUT | OUTPUT | INOUT", &t))?;
        self.expect(")")?;
        let properties = self.parse_properties_until_close()?;
        Ok(PortRec { name, width, direction, properties })
    }

    /// `(cellref c [(libraryref l)])` after `(cellref`.
    fn parse_cell_ref(&mut self) -> Result<CellRefRec> {
        let cell = self.next(false)?.text;
        let t = self.next(true)?;
        let library = match &*t.text {
            "(" => {
                self.expect("libraryref")?;
                let l = self.next(false)?.text;
                self.expect(")")?;
                self.expect(")")?;
                Some(l)
            }
            ")" => None,
            _ => return Err(unexpected(")", &t))
        };
        Ok(CellRefRec { cell, library })
    }

    /// after `(instance`.
    fn parse_instance(&mut self) -> Result<InstanceRec> {
        let name = self.parse_name_obj()?;
        let offset = self.tok.byte_offset();
        self.expect("(")?;
        self.expect("viewref")?;
        let view = self.parse_name_obj()?;
        self.expect("(")?;
        self.expect("cellref")?;
        let cell_ref = self.parse_cell_ref()?;
        self.expect(")")?;
        let properties = self.parse_properties_until_close()?;
        Ok(InstanceRec { name, view, cell_ref, properties, offset })
    }

    /// after `(portref`.
    fn parse_port_ref(&mut self) -> Result<PortRefRec> {
        let first = self.next(false)?;
        let (port, member) = if &*first.text == "(" {
            self.expect("member")?;
            let port = self.next(false)?.text;
            let idx = self.parse_u32()?;
            self.expect(")")?;
            (port, Some(idx))
        }
        else {
            (first.text, None)
        };
        let t = self.next(true)?;
        let instance = match &*t.text {
            "(" => {
                self.expect("instanceref")?;
                let inst = self.next(false)?.text;
                self.expect(")")?;
                self.expect(")")?;
                Some(inst)
            }
            ")" => None,
            _ => return Err(unexpected(")", &t))
        };
        Ok(PortRefRec { port, member, instance, offset: t.offset })
    }

    /// after `(net`.
    fn parse_net(&mut self) -> Result<NetRec> {
        let name = self.parse_name_obj()?;
        self.expect("(")?;
        self.expect("joined")?;
        let mut joined = Vec::new();
        loop {
            let t = self.next(true)?;
            match &*t.text {
                ")" => break,
                "(" => {
                    self.expect("portref")?;
                    joined.push(self.parse_port_ref()?);
                }
                _ => return Err(unexpected(")", &t))
            }
        }
        let properties = self.parse_properties_until_close()?;
        Ok(NetRec { name, joined, properties })
    }

    /// Parses a cell whose name token (right after `(cell`) was
    /// already read, and records it.
    pub fn parse_cell(&mut self, first: Token) -> Result<()> {
        let offset = first.offset;
        let name = self.parse_name_obj_from(first)?;
        for kw in ["(", "celltype", "GENERIC", ")", "(", "view"] {
            self.expect(kw)?;
        }
        let view = self.parse_name_obj()?;
        for kw in ["(", "viewtype", "NETLIST", ")", "(", "interface"] {
            self.expect(kw)?;
        }

        let mut ports = Vec::new();
        loop {
            let t = self.next(true)?;
            match &*t.text {
                ")" => break,
                "(" => {
                    self.expect("port")?;
                    ports.push(self.parse_port()?);
                }
                _ => return Err(unexpected(")", &t))
            }
        }

        let mut instances = Vec::new();
        let mut nets = Vec::new();
        let mut properties = Vec::new();
        loop {
            let t = self.next(true)?;
            match &*t.text {
                ")" => break,
                "(" => {}
                _ => return Err(unexpected(")", &t))
            }
            let t = self.next(true)?;
            if t.is("contents") {
                loop {
                    let t = self.next(true)?;
                    match &*t.text {
                        ")" => break,
                        "(" => {}
                        _ => return Err(unexpected(")", &t))
                    }
                    let t = self.next(true)?;
                    if t.is("instance") {
                        instances.push(self.parse_instance()?);
                    }
                    else if t.is("net") {
                        nets.push(self.parse_net()?);
                    }
                    else {
                        return Err(unexpected("instance | net", &t))
                    }
                }
            }
            else if t.is("property") {
                properties.push(self.parse_property()?);
            }
            else {
                return Err(unexpected("contents | property", &t))
            }
        }
        // cell end
        self.expect(")")?;

        let known: HashSet<&Ident> = instances.iter().map(|i| i.name.legal_name()).collect();
        for pr in nets.iter().flat_map(|n| n.joined.iter()) {
            if let Some(inst) = &pr.instance {
                if !known.contains(inst) {
                    clilog::error!(EDIF_REF, "bad instance ref {} in cell {}",
                                   inst, name.name);
                    return Err(EdifParseError::UnresolvedReference {
                        kind: "instance",
                        name: CompactString::from(inst.as_ref()),
                        offset: pr.offset,
                    })
                }
            }
        }

        self.out.items.push(ParsedItem::Cell(CellRec {
            name, view, ports, instances, nets, properties, offset
        }));
        Ok(())
    }

    /// after `(status`.
    fn parse_status(&mut self) -> Result<StatusRec> {
        let mut status = StatusRec::default();
        for kw in ["(", "written", "(", "timestamp"] {
            self.expect(kw)?;
        }
        for i in 0..6 {
            status.timestamp[i] = self.parse_u32()?;
        }
        for kw in [")", "(", "program"] {
            self.expect(kw)?;
        }
        status.program = Some(self.next(false)?.text);
        self.expect("(")?;
        self.expect("version")?;
        status.version = Some(self.next(false)?.text);
        self.expect(")")?;
        self.expect(")")?;
        loop {
            let t = self.next(true)?;
            match &*t.text {
                ")" => break,
                "(" => {}
                _ => return Err(unexpected(")", &t))
            }
            let t = self.next(true)?;
            if t.is("comment") {
                status.comments.push(self.next(false)?.text);
                self.expect(")")?;
            }
            else if t.is("metax") {
                let key = self.next(false)?.text;
                let value = self.parse_property_value()?;
                status.metax.push((key, value));
                self.expect(")")?;
            }
            else if t.is("property") {
                status.properties.push(self.parse_property()?);
            }
            else {
                return Err(unexpected("comment | metax | property", &t))
            }
        }
        // status end
        self.expect(")")?;
        Ok(status)
    }

    /// after `(library` or `(external`.
    fn parse_library_head(&mut self, external: bool, offset: u64) -> Result<LibraryRec> {
        let name = self.parse_name_obj()?;
        self.expect("(")?;
        self.expect("ediflevel")?;
        self.parse_u32()?;
        for kw in [")", "(", "technology", "(", "numberdefinition", ")", ")"] {
            self.expect(kw)?;
        }
        Ok(LibraryRec { name, external, cells: Vec::new(), offset })
    }

    /// after `(design`.
    fn parse_design(&mut self) -> Result<DesignRec> {
        let name = self.parse_name_obj()?;
        self.expect("(")?;
        self.expect("cellref")?;
        let cell_ref = self.parse_cell_ref()?;
        let properties = self.parse_properties_until_close()?;
        Ok(DesignRec { name, cell_ref, properties })
    }

    /// Consumes top-level forms until right after the next
    /// `(cell`, recording libraries, status, comments and the
    /// design on the way.
    ///
    /// Returns `false` once the closing `)` of the edif form has
    /// been consumed, which must be followed by end of file.
    pub fn parse_to_next_cell(&mut self) -> Result<bool> {
        loop {
            let t = match self.next_opt(true)? {
                Some(t) => t,
                None => return Err(EdifParseError::UnexpectedEof {
                    offset: self.tok.byte_offset()
                })
            };
            if &*t.text == ")" {
                if self.in_library {
                    self.in_library = false;
                    continue
                }
                if let Some(extra) = self.next_opt(true)? {
                    return Err(EdifParseError::UnexpectedTrailingToken {
                        found: CompactString::from(extra.text.as_ref()),
                        offset: extra.offset,
                    })
                }
                return Ok(false)
            }
            Self::expect_token("(", &t)?;
            let kw = self.next(true)?;
            if self.in_library {
                Self::expect_token("cell", &kw)?;
                return Ok(true)
            }
            if kw.is("library") || kw.is("external") {
                let lib = self.parse_library_head(kw.is("external"), kw.offset)?;
                self.out.items.push(ParsedItem::Library(lib));
                self.in_library = true;
            }
            else if kw.is("status") {
                let status = self.parse_status()?;
                if self.out.status.is_none() {
                    self.out.status = Some(status);
                }
            }
            else if kw.is("comment") {
                let comment = self.next(false)?.text;
                self.out.comments.push(comment);
                self.expect(")")?;
            }
            else if kw.is("design") {
                self.out.design = Some(self.parse_design()?);
            }
            else {
                return Err(unexpected("library | external | status | comment | design", &kw))
            }
        }
    }
}
