//! Parent net resolution across hierarchy boundaries.
//!
//! Every electrical node of the design is a set of nets joined
//! through hierarchical ports. Exactly one pin drives the node:
//! an output of a leaf instance, or an input port of the top
//! cell. The net containing that pin is the parent net of every
//! net in the set.

use std::collections::{ HashMap, HashSet, VecDeque };
use compact_str::CompactString;
use regex::Regex;
use crate::*;

/// Global name of the ground node in physical pin lookups.
pub const GLOBAL_LOGIC0: &str = "GLOBAL_LOGIC0";
/// Global name of the power node in physical pin lookups.
pub const GLOBAL_LOGIC1: &str = "GLOBAL_LOGIC1";

/// The result of [Netlist::net_aliases].
#[derive(Debug, Clone)]
pub struct NetAliases {
    /// The net containing the driver, `None` for a net without
    /// any pins.
    pub parent: Option<HierNet>,
    /// The driving pin.
    pub source: Option<HierPortInst>,
    /// All nets of the node, in visiting order, starting with the
    /// queried net.
    pub aliases: Vec<HierNet>,
    /// Pins of leaf instances on the node.
    pub leaf_pins: Vec<HierPortInst>,
}

impl Netlist {
    /// A primitive cell: a leaf inside the primitives library.
    pub fn is_primitive(&self, cell: CellId) -> bool {
        let c = self.cell(cell);
        c.is_leaf_or_black_box() && &*self.library(c.library).name == PRIMITIVES_LIBRARY
    }

    /// A cell named `GND`, in any library.
    pub fn is_gnd_source(&self, cell: CellId) -> bool {
        &*self.cell(cell).name == "GND"
    }

    /// A cell named `VCC`, in any library.
    pub fn is_vcc_source(&self, cell: CellId) -> bool {
        &*self.cell(cell).name == "VCC"
    }

    /// A constant driver: a `GND` or `VCC` primitive.
    pub fn is_static_source(&self, cell: CellId) -> bool {
        self.is_primitive(cell) && (self.is_gnd_source(cell) || self.is_vcc_source(cell))
    }

    /// Whether two cells have the same ports, with equal
    /// directions and widths.
    pub fn has_compatible_interface(&self, a: CellId, b: CellId) -> bool {
        let (a, b) = (self.cell(a), self.cell(b));
        a.ports.len() == b.ports.len() && a.ports.iter().all(|(k, &p)| {
            let p = self.port(p);
            b.ports.get(k).map(|&q| self.port(q)).map_or(false, |q| {
                q.direction == p.direction && q.width == p.width
            })
        })
    }

    fn multiple_sources(&self, start: &HierNet, first: &HierPortInst,
                        second: &HierPortInst) -> EdifError {
        let (net, first, second) = (start.name(self), first.name(self), second.name(self));
        clilog::error!(EDIF_ALIAS_MULTI, "multiple sources on net {}: {} and {}",
                       net, first, second);
        EdifError::MultipleSources { net, first, second }
    }

    /// Walks the electrical node of `start` through the
    /// hierarchy and finds its driver.
    ///
    /// Input ports of the top cell drive their nets. A bidirectional
    /// top-level port is taken as the driver only when no other
    /// driver exists.
    pub fn net_aliases(&self, start: &HierNet) -> Result<NetAliases> {
        let NodeWalk { source, fallback, aliases, leaf_pins } = self.walk_node(start)?;
        let (parent, source) = match source.or(fallback) {
            Some((n, s)) => (Some(n), Some(s)),
            None => {
                if !self.net(start.net).port_insts.is_empty() {
                    let net = start.name(self);
                    clilog::error!(EDIF_ALIAS_MULTI,
                                   "could not identify parent net of {}", net);
                    return Err(EdifError::UndrivenNet { net })
                }
                (None, None)
            }
        };
        Ok(NetAliases { parent, source, aliases, leaf_pins })
    }

    /// Leaf pins on the node of `net`: outputs if
    /// `include_sources`, inputs if `include_sinks`. Bidirectional
    /// pins are never listed. An undriven node is not an error.
    pub fn get_leaf_hier_port_insts(&self, net: &HierNet, include_sources: bool,
                                    include_sinks: bool) -> Result<Vec<HierPortInst>> {
        if !include_sources && !include_sinks {
            return Ok(vec![])
        }
        Ok(self.walk_node(net)?.leaf_pins.into_iter()
           .filter(|p| {
               let port = p.port(self);
               (include_sources && port.is_output()) || (include_sinks && port.is_input())
           })
           .collect())
    }

    /// Leaf input pins on the node of `net`.
    pub fn get_sinks_from_net(&self, net: &HierNet) -> Result<Vec<HierPortInst>> {
        self.get_leaf_hier_port_insts(net, false, true)
    }

    fn walk_node(&self, start: &HierNet) -> Result<NodeWalk> {
        let mut queue = VecDeque::from([start.clone()]);
        let mut visited = HashSet::from([start.clone()]);
        let mut aliases = Vec::new();
        let mut leaf_pins = Vec::new();
        let mut source: Option<(HierNet, HierPortInst)> = None;
        let mut fallback: Option<(HierNet, HierPortInst)> = None;

        while let Some(net) = queue.pop_front() {
            for p in net.port_insts(self) {
                let pi = p.get(self);
                let port = self.port(pi.port);
                let next = match pi.instance {
                    None if p.hier.is_top() => {
                        if port.is_input() {
                            if let Some((_, s)) = &source {
                                return Err(self.multiple_sources(start, s, &p))
                            }
                            source = Some((net.clone(), p));
                        }
                        else if port.is_inout() {
                            if let Some((_, s)) = &fallback {
                                return Err(self.multiple_sources(start, s, &p))
                            }
                            fallback = Some((net.clone(), p));
                        }
                        None
                    }
                    None => p.port_in_parent(self).and_then(|pp| pp.hier_net(self)),
                    Some(inst) => {
                        let ct = self.instance(inst).cell_type;
                        if self.cell(ct).is_leaf_or_black_box() {
                            if port.is_output() {
                                if let Some((_, s)) = &source {
                                    return Err(self.multiple_sources(start, s, &p))
                                }
                                source = Some((net.clone(), p.clone()));
                            }
                            leaf_pins.push(p);
                            None
                        }
                        else {
                            p.internal_net(self)
                        }
                    }
                };
                if let Some(n) = next {
                    if visited.insert(n.clone()) {
                        queue.push_back(n);
                    }
                }
            }
            aliases.push(net);
        }
        Ok(NodeWalk { source, fallback, aliases, leaf_pins })
    }

    /// Drops the parent net map and the pin lists derived with it.
    ///
    /// All mutation methods call this.
    pub fn reset_parent_net_map(&mut self) {
        self.cache = ResolveCache::default();
    }

    /// Nets the parent net map is built from: top-level ports
    /// other than outputs, then leaf outputs top-down.
    fn parent_net_seeds(&self) -> Result<Vec<HierNet>> {
        let top = self.top_cell()?;
        let mut seeds = Vec::new();
        for &n in self.cell(top).nets.values() {
            let has_source = self.net(n).port_insts.values().any(|&p| {
                let pi = self.port_inst(p);
                pi.instance.is_none() && !self.port(pi.port).is_output()
            });
            if has_source {
                seeds.push(HierNet::new(HierInstance::top(), n));
            }
        }
        let mut queue = VecDeque::from([HierInstance::top()]);
        while let Some(h) = queue.pop_front() {
            for &inst in self.cell(h.cell_type(self)?).instances.values() {
                let i = self.instance(inst);
                if !self.cell(i.cell_type).is_leaf_or_black_box() {
                    queue.push_back(h.child(inst));
                    continue
                }
                for &p in i.port_insts.values() {
                    let pi = self.port_inst(p);
                    if let (true, Some(net)) = (self.port(pi.port).is_output(), pi.net) {
                        seeds.push(HierNet::new(h.clone(), net));
                    }
                }
            }
        }
        Ok(seeds)
    }

    fn ensure_parent_net_map(&mut self) -> Result<()> {
        if self.cache.parent_nets.is_some() {
            return Ok(())
        }
        let timer = clilog::stimer!("generate parent net map");
        let mut cache = ResolveCache::default();
        let mut map = HashMap::new();
        for seed in self.parent_net_seeds()? {
            if map.contains_key(&seed) {
                continue
            }
            let NetAliases { parent, source, aliases, leaf_pins } = self.net_aliases(&seed)?;
            let parent = match parent {
                Some(p) => p,
                None => continue
            };
            if let Some(s) = source.and_then(|s| self.port_inst(s.port_inst).instance) {
                let ct = self.instance(s).cell_type;
                if self.is_static_source(ct) {
                    match self.is_gnd_source(ct) {
                        true => cache.gnd_pins.extend(leaf_pins.iter().cloned()),
                        false => cache.vcc_pins.extend(leaf_pins.iter().cloned()),
                    }
                }
            }
            for a in aliases {
                map.insert(a, parent.clone());
            }
            cache.physical_pins.insert(parent, leaf_pins);
        }
        clilog::debug!(EDIF_RESOLVE, "parent net map: {} nets, {} parents",
                       map.len(), cache.physical_pins.len());
        cache.parent_nets = Some(map);
        self.cache = cache;
        clilog::finish!(timer);
        Ok(())
    }

    /// The map from every reachable net to its parent net.
    pub fn parent_net_map(&mut self) -> Result<&HashMap<HierNet, HierNet>> {
        self.ensure_parent_net_map()?;
        Ok(self.cache.parent_nets.get_or_insert_with(HashMap::new))
    }

    /// The canonical net driving `net`, or `None` if `net` is not
    /// reachable from any driver.
    pub fn get_parent_net(&mut self, net: &HierNet) -> Result<Option<HierNet>> {
        Ok(self.parent_net_map()?.get(net).cloned())
    }

    /// Leaf pins on the node of `net`. Constant nodes also list
    /// their pins under [Netlist::get_global_ground_pins] and
    /// [Netlist::get_global_power_pins].
    pub fn get_physical_pins(&mut self, net: &HierNet) -> Result<Option<&[HierPortInst]>> {
        let parent = match self.get_parent_net(net)? {
            Some(p) => p,
            None => return Ok(None)
        };
        Ok(self.cache.physical_pins.get(&parent).map(Vec::as_slice))
    }

    /// Like [Netlist::get_physical_pins] on a `/`-separated net
    /// name. `GLOBAL_LOGIC0` and `GLOBAL_LOGIC1` name the global
    /// constant nodes.
    pub fn get_physical_pins_by_name(&mut self, name: &str)
                                     -> Result<Option<&[HierPortInst]>> {
        match name {
            GLOBAL_LOGIC0 => self.get_global_ground_pins().map(Some),
            GLOBAL_LOGIC1 => self.get_global_power_pins().map(Some),
            _ => match self.hier_net_from_name(name) {
                Some(n) => self.get_physical_pins(&n),
                None => Ok(None)
            }
        }
    }

    pub fn get_global_ground_pins(&mut self) -> Result<&[HierPortInst]> {
        self.ensure_parent_net_map()?;
        Ok(&self.cache.gnd_pins)
    }

    pub fn get_global_power_pins(&mut self) -> Result<&[HierPortInst]> {
        self.ensure_parent_net_map()?;
        Ok(&self.cache.vcc_pins)
    }

    /// All leaf instances below `hier`, breadth first.
    ///
    /// Without `include_black_boxes`, only primitives count as
    /// leaves and black boxes outside the primitives library are
    /// skipped.
    pub fn get_all_leaf_descendants(&self, hier: &HierInstance,
                                    include_black_boxes: bool) -> Result<Vec<HierInstance>> {
        let mut ret = Vec::new();
        let mut queue = VecDeque::from([hier.clone()]);
        while let Some(h) = queue.pop_front() {
            let ct = h.cell_type(self)?;
            let cell = self.cell(ct);
            if self.is_primitive(ct) ||
                (include_black_boxes && cell.is_leaf_or_black_box()) {
                ret.push(h);
            }
            else {
                queue.extend(h.children(self)?);
            }
        }
        Ok(ret)
    }

    /// Leaf descendants whose full name matches a wildcard
    /// pattern, where `*` matches any sequence.
    pub fn get_all_leaf_descendants_matching(
        &self, hier: &HierInstance, wildcard: &str, include_black_boxes: bool
    ) -> Result<Vec<HierInstance>> {
        let re = wildcard_regex(wildcard);
        Ok(self.get_all_leaf_descendants(hier, include_black_boxes)?
           .into_iter()
           .filter(|h| re.is_match(&h.name(self)))
           .collect())
    }

    /// Instances strictly below `hier`, breadth first, filtered by
    /// an optional wildcard on the full name.
    ///
    /// Primitives are always candidates. Other instances are
    /// descended into, and listed too unless `leaves_only`.
    pub fn get_all_descendants(&self, hier: &HierInstance, wildcard: Option<&str>,
                               leaves_only: bool) -> Result<Vec<HierInstance>> {
        let re = wildcard.map(wildcard_regex);
        let matches = |h: &HierInstance| re.as_ref().map_or(true, |re| re.is_match(&h.name(self)));
        let mut ret = Vec::new();
        let mut queue = VecDeque::from([hier.clone()]);
        while let Some(h) = queue.pop_front() {
            for child in h.children(self)? {
                let ct = child.cell_type(self)?;
                if self.is_primitive(ct) {
                    if matches(&child) {
                        ret.push(child);
                    }
                    continue
                }
                if !leaves_only && matches(&child) {
                    ret.push(child.clone());
                }
                queue.push_back(child);
            }
        }
        Ok(ret)
    }

    /// All instances of the design, at any depth, whose full name
    /// matches a wildcard pattern.
    pub fn find_cell_insts(&self, wildcard: &str) -> Result<Vec<HierInstance>> {
        self.get_all_descendants(&HierInstance::top(), Some(wildcard), false)
    }
}

/// What a walk over one electrical node collects.
struct NodeWalk {
    source: Option<(HierNet, HierPortInst)>,
    fallback: Option<(HierNet, HierPortInst)>,
    aliases: Vec<HierNet>,
    leaf_pins: Vec<HierPortInst>,
}

pub(crate) fn wildcard_regex(wildcard: &str) -> Regex {
    let mut pattern = CompactString::from("^");
    for c in wildcard.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])))
        }
    }
    pattern.push('$');
    // every character but `*` is escaped, so this cannot fail.
    Regex::new(&pattern).unwrap_or_else(|_| unreachable!())
}
