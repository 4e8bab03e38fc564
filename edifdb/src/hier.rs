//! Hierarchical addressing of instances, nets and pins.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use compact_str::CompactString;
use itertools::Itertools;
use crate::*;

/// A chain of instances from the top cell down.
///
/// The empty chain addresses the top cell itself.
#[derive(PartialEq, Eq, Clone, Default)]
pub struct HierInstance {
    /// The innermost instance, `None` for the top level.
    pub cur: Option<InstanceId>,
    /// The enclosing instances.
    pub prev: Option<Arc<HierInstance>>,
}

/// Reverse iterator of a [HierInstance], yielding instances
/// from the bottom up.
pub struct HierInstanceRevIter<'i>(Option<&'i HierInstance>);

impl<'i> Iterator for HierInstanceRevIter<'i> {
    type Item = InstanceId;

    #[inline]
    fn next(&mut self) -> Option<InstanceId> {
        let h = self.0?;
        let ret = h.cur?;
        self.0 = h.prev.as_deref();
        Some(ret)
    }
}

/// `Hash(a/b/c) :== Hash(c, b, a)`.
impl Hash for HierInstance {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for i in self.iter() {
            i.hash(state);
        }
    }
}

impl fmt::Debug for HierInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HierInstance({})", self.topdown().iter().map(|i| i.0).format("/"))
    }
}

impl HierInstance {
    #[inline]
    pub const fn top() -> HierInstance {
        HierInstance { cur: None, prev: None }
    }

    #[inline]
    pub fn is_top(&self) -> bool {
        self.cur.is_none()
    }

    #[inline]
    pub fn iter(&self) -> HierInstanceRevIter {
        HierInstanceRevIter(Some(self))
    }

    /// Instances from the top down.
    pub fn topdown(&self) -> Vec<InstanceId> {
        let mut v = self.iter().collect::<Vec<_>>();
        v.reverse();
        v
    }

    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// build a hier instance using a top-down iterator.
    pub fn from_topdown(iter: impl IntoIterator<Item = InstanceId>) -> HierInstance {
        iter.into_iter().fold(HierInstance::top(), |h, i| h.child(i))
    }

    /// The address of instance `inst` inside this one.
    #[inline]
    pub fn child(&self, inst: InstanceId) -> HierInstance {
        HierInstance {
            cur: Some(inst),
            prev: match self.is_top() {
                true => None,
                false => Some(Arc::new(self.clone()))
            }
        }
    }

    /// The enclosing instance, or `None` at the top.
    pub fn parent(&self) -> Option<HierInstance> {
        self.cur?;
        Some(self.prev.as_deref().cloned().unwrap_or_default())
    }

    /// The cell this instance is of.
    pub fn cell_type(&self, netlist: &Netlist) -> Result<CellId> {
        match self.cur {
            Some(i) => Ok(netlist.instance(i).cell_type),
            None => netlist.top_cell()
        }
    }

    /// `/`-joined instance names, empty at the top.
    pub fn name(&self, netlist: &Netlist) -> CompactString {
        self.topdown().iter()
            .map(|&i| &*netlist.instance(i).name)
            .join(HIER_SEP).into()
    }

    /// Addresses of the instances of this cell.
    pub fn children(&self, netlist: &Netlist) -> Result<Vec<HierInstance>> {
        let cell = netlist.cell(self.cell_type(netlist)?);
        Ok(cell.instances.values().map(|&i| self.child(i)).collect())
    }
}

fn join_name(prefix: &str, name: &str) -> CompactString {
    match prefix.is_empty() {
        true => name.into(),
        false => compact_str::format_compact!("{}{}{}", prefix, HIER_SEP, name)
    }
}

/// A net inside a hierarchical instance.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct HierNet {
    pub hier: HierInstance,
    pub net: NetId,
}

impl HierNet {
    pub fn new(hier: HierInstance, net: NetId) -> HierNet {
        HierNet { hier, net }
    }

    /// Full name, `u_inv/y`, or `y` for a net of the top cell.
    pub fn name(&self, netlist: &Netlist) -> CompactString {
        join_name(&self.hier.name(netlist), &netlist.net(self.net).name)
    }

    /// The pins joined by this net.
    pub fn port_insts<'a>(&'a self, netlist: &'a Netlist)
                          -> impl Iterator<Item = HierPortInst> + 'a {
        netlist.net(self.net).port_insts.values()
            .map(move |&p| HierPortInst::new(self.hier.clone(), p))
    }
}

/// A pin inside a hierarchical instance.
///
/// For pins of an instance, `hier` is the scope containing that
/// instance. For boundary pins, it is the instance whose cell
/// boundary the pin is on.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct HierPortInst {
    pub hier: HierInstance,
    pub port_inst: PortInstId,
}

impl HierPortInst {
    pub fn new(hier: HierInstance, port_inst: PortInstId) -> HierPortInst {
        HierPortInst { hier, port_inst }
    }

    #[inline]
    pub fn get<'a>(&self, netlist: &'a Netlist) -> &'a PortInst {
        netlist.port_inst(self.port_inst)
    }

    #[inline]
    pub fn port<'a>(&self, netlist: &'a Netlist) -> &'a Port {
        netlist.port(self.get(netlist).port)
    }

    /// Full name, `u_inv/lut/I0`, or `u_inv/a` for a boundary pin.
    pub fn name(&self, netlist: &Netlist) -> CompactString {
        let pi = self.get(netlist);
        join_name(&self.hier.name(netlist), &pi.full_name(netlist))
    }

    /// The net joining this pin in its scope.
    pub fn hier_net(&self, netlist: &Netlist) -> Option<HierNet> {
        self.get(netlist).net.map(|n| HierNet::new(self.hier.clone(), n))
    }

    /// A pin on the cell boundary of the top level.
    pub fn is_top_level_port(&self, netlist: &Netlist) -> bool {
        self.hier.is_top() && self.get(netlist).is_top_level_port()
    }

    /// For a boundary pin below the top, the pin of the same name
    /// on the instance in the parent scope.
    pub fn port_in_parent(&self, netlist: &Netlist) -> Option<HierPortInst> {
        let pi = self.get(netlist);
        if pi.instance.is_some() {
            return None
        }
        let inst = self.hier.cur?;
        let parent = self.hier.parent()?;
        netlist.instance(inst).port_insts.get(&pi.name)
            .map(|&p| HierPortInst::new(parent, p))
    }

    /// For a pin of an instance, the net connected to it inside
    /// the instance.
    pub fn internal_net(&self, netlist: &Netlist) -> Option<HierNet> {
        let pi = self.get(netlist);
        let inst = pi.instance?;
        let cell = netlist.cell(netlist.instance(inst).cell_type);
        cell.internal_nets.get(&pi.name)
            .map(|&n| HierNet::new(self.hier.child(inst), n))
    }

    /// The instance owning this pin, addressed hierarchically.
    pub fn hier_instance(&self, netlist: &Netlist) -> HierInstance {
        match self.get(netlist).instance {
            Some(i) => self.hier.child(i),
            None => self.hier.clone()
        }
    }

    /// Whether the instance owning this pin is of a leaf or
    /// black-box cell.
    pub fn is_leaf_pin(&self, netlist: &Netlist) -> bool {
        match self.get(netlist).instance {
            Some(i) => netlist.cell(netlist.instance(i).cell_type).is_leaf_or_black_box(),
            None => false
        }
    }
}

impl Netlist {
    /// Look up a hierarchical instance by `/`-separated
    /// display names. The empty string is the top.
    pub fn hier_instance_from_name(&self, name: &str) -> Option<HierInstance> {
        let mut cell = self.top_cell().ok()?;
        let mut hier = HierInstance::top();
        if name.is_empty() {
            return Some(hier)
        }
        for seg in name.split(HIER_SEP) {
            let inst = *self.cell(cell).instances.get(seg)?;
            cell = self.instance(inst).cell_type;
            hier = hier.child(inst);
        }
        Some(hier)
    }

    /// Look up a hierarchical net by full name (`u_inv/y`).
    pub fn hier_net_from_name(&self, name: &str) -> Option<HierNet> {
        let (hier, net) = match name.rsplit_once(HIER_SEP) {
            Some((h, n)) => (self.hier_instance_from_name(h)?, n),
            None => (HierInstance::top(), name)
        };
        let cell = self.cell(hier.cell_type(self).ok()?);
        let net = *cell.nets.get(net)?;
        Some(HierNet::new(hier, net))
    }

    /// Look up a hierarchical pin by full name (`u_inv/lut/I0`
    /// or a top-level port pin `clk`).
    pub fn hier_port_inst_from_name(&self, name: &str) -> Option<HierPortInst> {
        let (prefix, pin) = match name.rsplit_once(HIER_SEP) {
            Some((p, n)) => (p, n),
            None => {
                let top = self.cell(self.top_cell().ok()?);
                let net = *top.internal_nets.get(name)?;
                let p = *self.net(net).port_insts.get(name)?;
                return Some(HierPortInst::new(HierInstance::top(), p))
            }
        };
        let hier = self.hier_instance_from_name(prefix)?;
        let inst = hier.cur?;
        let p = *self.instance(inst).port_insts.get(pin)?;
        Some(HierPortInst::new(hier.parent()?, p))
    }
}
