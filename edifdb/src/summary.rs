//! Order-independent structural dump of a netlist.

use std::fmt::Write;
use either::Either;
use itertools::Itertools;
use crate::*;

fn props(p: &Properties) -> String {
    if p.is_empty() {
        return String::new()
    }
    let s = p.iter()
        .map(|(k, v)| match &v.owner {
            Some(o) => format!("{}={}@{}", k, v, o),
            None => format!("{}={}", k, v)
        })
        .sorted()
        .join(" ");
    format!(" {{{}}}", s)
}

impl Netlist {
    fn cell_path_of(&self, c: CellId) -> String {
        let cell = self.cell(c);
        format!("{}{}{}", self.library(cell.library).name, HIER_SEP, cell.name)
    }

    /// Bits of a port as shown in the summary.
    fn port_bits(&self, p: PortId) -> impl Iterator<Item = Ident> + '_ {
        let port = self.port(p);
        match port.is_bus() {
            true => Either::Left((0..port.width as i32).map(move |i| port.port_inst_name(i))),
            false => Either::Right(std::iter::once(port.name.clone()))
        }
    }

    /// A sorted line-per-object dump of the reachable netlist.
    ///
    /// Two netlists with the same libraries, cells, ports,
    /// instances, connectivity, properties and design produce the
    /// same summary regardless of insertion order and of the
    /// legal renames they carry. Status and comments are left out.
    pub fn canonical_summary(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("netlist {}", self.name));
        for &l in self.libraries.values() {
            let lib = self.library(l);
            lines.push(format!("library {}{}", lib.name,
                               if lib.external { " external" } else { "" }));
        }
        for c in self.iter_cells() {
            let cell = self.cell(c);
            let path = self.cell_path_of(c);
            lines.push(format!("cell {} view={}{}", path, cell.view, props(&cell.properties)));
            for &p in cell.ports.values() {
                let port = self.port(p);
                lines.push(format!(
                    "port {}{}{} {} {} [{}]{}", path, HIER_SEP, port.name,
                    port.direction.keyword(), port.width,
                    self.port_bits(p).join(","), props(&port.properties)));
            }
            for &i in cell.instances.values() {
                let inst = self.instance(i);
                lines.push(format!(
                    "inst {}{}{} -> {} view={}{}", path, HIER_SEP, inst.name,
                    self.cell_path_of(inst.cell_type), inst.view, props(&inst.properties)));
            }
            for &n in cell.nets.values() {
                let net = self.net(n);
                let pins = net.port_insts.values()
                    .map(|&p| self.port_inst(p).full_name(self))
                    .sorted()
                    .join(" ");
                lines.push(format!("net {}{}{}: {}{}", path, HIER_SEP, net.name,
                                   pins, props(&net.properties)));
            }
        }
        if let Some(d) = &self.design {
            lines.push(format!("design {} top={}{}", d.name,
                               self.cell_path_of(d.top), props(&d.properties)));
        }
        lines.sort();
        let mut s = String::new();
        for l in lines {
            // infallible on String
            let _ = writeln!(s, "{}", l);
        }
        s
    }
}
