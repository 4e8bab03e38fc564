use edifdb::*;

const HIER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/hier.edf");

fn load() -> Netlist {
    Netlist::from_edif_file(HIER, &ParserConfig::default()).unwrap()
}

fn pin_names(nl: &Netlist, pins: &[HierPortInst]) -> Vec<String> {
    let mut v = pins.iter().map(|p| p.name(nl).to_string()).collect::<Vec<_>>();
    v.sort();
    v
}

fn parent_name(nl: &mut Netlist, net: &str) -> String {
    let n = nl.hier_net_from_name(net).unwrap();
    let p = nl.get_parent_net(&n).unwrap().unwrap();
    p.name(nl).to_string()
}

#[test]
fn structure() {
    clilog::init_stdout_simple_trace();

    let nl = load();
    assert_eq!(nl.counts(), (8, 9, 13, 20));
    assert_eq!(nl.part_name(), Some("xc7a35tcpg236-1"));
    assert_eq!(nl.design_property("PART").unwrap().owner.as_deref(), Some("Xilinx"));
    assert_eq!(nl.comments.len(), 1);
    assert_eq!(nl.status.as_ref().unwrap().timestamp, [2024, 3, 18, 9, 41, 12]);

    let top = nl.top_cell().unwrap();
    assert_eq!(&*nl.cell(top).name, "top");
    assert_eq!(nl.cell_by_name(WORK_LIBRARY, "top"), Some(top));
    assert_eq!(nl.cell(top).properties["ECO_CHECKSUM"].owner.as_deref(), Some("Xilinx"));

    let prims = nl.library_by_name(PRIMITIVES_LIBRARY).unwrap();
    assert_eq!(nl.library(prims).cells.len(), 6);
    let lut2 = nl.cell_by_name(PRIMITIVES_LIBRARY, "LUT2").unwrap();
    let ibuf = nl.cell_by_name(PRIMITIVES_LIBRARY, "IBUF").unwrap();
    let obuf = nl.cell_by_name(PRIMITIVES_LIBRARY, "OBUF").unwrap();
    let gnd = nl.cell_by_name(PRIMITIVES_LIBRARY, "GND").unwrap();
    assert!(nl.is_primitive(lut2));
    assert!(!nl.is_primitive(top));
    assert!(nl.is_gnd_source(gnd) && nl.is_static_source(gnd));
    assert!(!nl.is_vcc_source(gnd));
    assert!(nl.has_compatible_interface(ibuf, obuf));
    assert!(!nl.has_compatible_interface(ibuf, lut2));

    let ff = *nl.cell(top).instances.get("ff_reg[0]").unwrap();
    assert_eq!(&*nl.legal_name(EntityRef::Instance(ff)), "ff_reg_0_");
    assert_eq!(&*nl.instance(ff).properties["INIT"].value, "1'b0");
    assert_eq!(nl.instance(ff).port_insts.len(), 5);

    let c0 = *nl.cell(top).nets.get("<const0>").unwrap();
    assert_eq!(&*nl.legal_name(EntityRef::Net(c0)), "&_const0_");
    let keys = nl.net(c0).port_insts.keys().map(|k| &**k).collect::<Vec<_>>();
    assert_eq!(keys, ["GND/G", "ff_reg[0]/R", "u_inv/sel[1]", "u_inv2/sel[1]"]);

    let debug = nl.cell(top).nets["inv_out"];
    assert_eq!(nl.net(debug).properties["MARK_DEBUG"].bool_value(), Some(true));
}

#[test]
fn bus_ports() {
    let nl = load();
    let top = nl.top_cell().unwrap();
    let q_id = nl.cell(top).port_by_name("q").unwrap();
    assert_eq!(nl.cell(top).port_by_name("q[3:0]"), Some(q_id));
    assert_eq!(nl.cell(top).port_by_pin_name("q[0]"), Some(q_id));
    assert_eq!(&*nl.legal_name(EntityRef::Port(q_id)), "q");

    let q = nl.port(q_id);
    assert_eq!(&*q.name, "q[3:0]");
    assert_eq!(&*q.bus_name, "q");
    assert!(q.is_bus() && q.is_output() && q.is_little_endian());
    assert_eq!(q.width, 4);
    assert_eq!(q.bit_of_index(0), Some(3));
    assert_eq!(q.bit_of_index(3), Some(0));
    assert_eq!(&*q.port_inst_name(3), "q[0]");
    assert_eq!(q.port_inst_names().iter().map(|s| &**s).collect::<Vec<_>>(),
               ["q[3]", "q[2]", "q[1]", "q[0]"]);

    let qnet = nl.cell(top).internal_nets["q[0]"];
    assert_eq!(&*nl.net(qnet).name, "q[0]");
    let pin = nl.net(qnet).port_insts["q[0]"];
    assert!(nl.port_inst(pin).is_top_level_port());
    assert_eq!(nl.port_inst(pin).index, 3);

    let clk = nl.port(nl.cell(top).port_by_name("clk").unwrap());
    assert!(!clk.is_bus() && clk.is_input());
    assert_eq!(&*clk.properties["CLOCK_BUFFER_TYPE"].value, "BUFG");
    assert!(q.properties.is_empty());
    assert_eq!(clk.bit_of_index(0), None);
    assert_eq!(&*clk.port_inst_name(-1), "clk");
}

#[test]
fn hierarchy_lookup() {
    let nl = load();
    let h = nl.hier_instance_from_name("u_inv2/lut").unwrap();
    assert_eq!(h.depth(), 2);
    assert_eq!(h.name(&nl), "u_inv2/lut");
    assert_eq!(&*nl.cell(h.cell_type(&nl).unwrap()).name, "LUT2");
    assert_eq!(h.parent().unwrap().name(&nl), "u_inv2");
    assert_eq!(HierInstance::from_topdown(h.topdown()), h);
    assert!(nl.hier_instance_from_name("u_inv2/nope").is_none());
    assert!(nl.hier_instance_from_name("").unwrap().is_top());

    let u_inv = nl.hier_instance_from_name("u_inv").unwrap();
    assert_ne!(u_inv, nl.hier_instance_from_name("u_inv2").unwrap());
    assert_eq!(u_inv.children(&nl).unwrap().len(), 1);

    let i1 = nl.hier_port_inst_from_name("u_inv2/lut/I1").unwrap();
    assert_eq!(i1.name(&nl), "u_inv2/lut/I1");
    assert!(i1.is_leaf_pin(&nl));
    assert_eq!(i1.hier_instance(&nl), h);
    assert_eq!(i1.hier_net(&nl).unwrap().name(&nl), "u_inv2/s1");

    let sel = nl.hier_port_inst_from_name("u_inv2/sel[1]").unwrap();
    assert_eq!(sel.name(&nl), "u_inv2/sel[1]");
    assert!(!sel.is_leaf_pin(&nl));
    let inner = sel.internal_net(&nl).unwrap();
    assert_eq!(inner.name(&nl), "u_inv2/s1");
    // sel[0] has no net inside the cell.
    let sel0 = nl.hier_port_inst_from_name("u_inv2/sel[0]").unwrap();
    assert!(sel0.internal_net(&nl).is_none());

    let boundary = inner.port_insts(&nl)
        .find(|p| p.get(&nl).instance.is_none())
        .unwrap();
    assert_eq!(boundary.name(&nl), "u_inv2/sel[1]");
    assert!(!boundary.is_top_level_port(&nl));
    assert_eq!(boundary.port_in_parent(&nl), Some(sel));

    let d = nl.hier_port_inst_from_name("d").unwrap();
    assert!(d.is_top_level_port(&nl));
    assert!(d.port_in_parent(&nl).is_none());
    assert!(nl.hier_net_from_name("u_inv/nope").is_none());
}

#[test]
fn leaf_descendants() {
    let nl = load();
    let top = HierInstance::top();
    let leaves = nl.get_all_leaf_descendants(&top, false).unwrap();
    let names = leaves.iter().map(|h| h.name(&nl).to_string()).collect::<Vec<_>>();
    assert_eq!(names, ["GND", "VCC", "clk_IBUF_inst", "d_IBUF_inst", "ff_reg[0]",
                       "q_OBUF_0_inst", "u_inv/lut", "u_inv2/lut"]);

    let luts = nl.get_all_leaf_descendants_matching(&top, "u_inv*/lut", false).unwrap();
    assert_eq!(luts.len(), 2);
    let ibufs = nl.get_all_leaf_descendants_matching(&top, "*IBUF*", true).unwrap();
    assert_eq!(ibufs.len(), 2);

    let inner = nl.hier_instance_from_name("u_inv").unwrap();
    let below = nl.get_all_leaf_descendants(&inner, false).unwrap();
    assert_eq!(below.len(), 1);
    assert_eq!(below[0].name(&nl), "u_inv/lut");
}

#[test]
fn all_descendants() {
    let nl = load();
    let top = HierInstance::top();
    let names = |v: Vec<HierInstance>| {
        v.iter().map(|h| h.name(&nl).to_string()).collect::<Vec<_>>()
    };

    let all = names(nl.get_all_descendants(&top, None, false).unwrap());
    assert_eq!(all.len(), 10);
    assert!(all.contains(&"u_inv".to_string()) && all.contains(&"u_inv2/lut".to_string()));
    let leaves = names(nl.get_all_descendants(&top, None, true).unwrap());
    assert_eq!(leaves.len(), 8);
    assert!(!leaves.contains(&"u_inv".to_string()));

    let stages = names(nl.find_cell_insts("u_inv*").unwrap());
    assert_eq!(stages, ["u_inv", "u_inv2", "u_inv/lut", "u_inv2/lut"]);
    assert_eq!(names(nl.find_cell_insts("*_IBUF_inst").unwrap()),
               ["clk_IBUF_inst", "d_IBUF_inst"]);
    assert!(nl.find_cell_insts("nope*").unwrap().is_empty());

    // the start instance itself is not listed.
    let inner = nl.hier_instance_from_name("u_inv2").unwrap();
    assert_eq!(names(nl.get_all_descendants(&inner, Some("*"), false).unwrap()), ["u_inv2/lut"]);
}

#[test]
fn leaf_pins_on_net() {
    let nl = load();
    let mid = nl.hier_net_from_name("u_inv2/a").unwrap();
    let both = nl.get_leaf_hier_port_insts(&mid, true, true).unwrap();
    assert_eq!(pin_names(&nl, &both), ["u_inv/lut/O", "u_inv2/lut/I0"]);
    let sources = nl.get_leaf_hier_port_insts(&mid, true, false).unwrap();
    assert_eq!(pin_names(&nl, &sources), ["u_inv/lut/O"]);
    let sinks = nl.get_sinks_from_net(&mid).unwrap();
    assert_eq!(pin_names(&nl, &sinks), ["u_inv2/lut/I0"]);
    assert!(nl.get_leaf_hier_port_insts(&mid, false, false).unwrap().is_empty());

    let c1 = nl.hier_net_from_name("<const1>").unwrap();
    assert_eq!(pin_names(&nl, &nl.get_sinks_from_net(&c1).unwrap()), ["ff_reg[0]/CE"]);
    // top-level ports are not leaf pins.
    let d = nl.hier_net_from_name("d").unwrap();
    assert_eq!(pin_names(&nl, &nl.get_sinks_from_net(&d).unwrap()), ["d_IBUF_inst/I"]);
}

#[test]
fn parent_nets() {
    clilog::init_stdout_simple_trace();

    let mut nl = load();
    assert_eq!(parent_name(&mut nl, "u_inv2/a"), "u_inv/y");
    assert_eq!(parent_name(&mut nl, "mid"), "u_inv/y");
    assert_eq!(parent_name(&mut nl, "u_inv/a"), "d_IBUF");
    assert_eq!(parent_name(&mut nl, "d"), "d");
    assert_eq!(parent_name(&mut nl, "clk_IBUF"), "clk_IBUF");
    assert_eq!(parent_name(&mut nl, "q[0]"), "q[0]");
    assert_eq!(parent_name(&mut nl, "inv_out"), "u_inv2/y");
    assert_eq!(parent_name(&mut nl, "u_inv2/s1"), "<const0>");
    assert_eq!(nl.parent_net_map().unwrap().len(), 16);

    let mid = nl.hier_net_from_name("mid").unwrap();
    let aliases = nl.net_aliases(&mid).unwrap();
    assert_eq!(aliases.aliases.len(), 3);
    assert_eq!(aliases.aliases[0], mid);
    assert_eq!(aliases.source.unwrap().name(&nl), "u_inv/lut/O");
    assert_eq!(pin_names(&nl, &aliases.leaf_pins), ["u_inv/lut/O", "u_inv2/lut/I0"]);

    let pins = nl.get_physical_pins_by_name("u_inv2/a").unwrap().unwrap().to_vec();
    assert_eq!(pin_names(&nl, &pins), ["u_inv/lut/O", "u_inv2/lut/I0"]);
    assert!(nl.get_physical_pins_by_name("nope").unwrap().is_none());
}

#[test]
fn global_constant_pins() {
    let mut nl = load();
    let gnd = nl.get_global_ground_pins().unwrap().to_vec();
    assert_eq!(pin_names(&nl, &gnd),
               ["GND/G", "ff_reg[0]/R", "u_inv/lut/I1", "u_inv2/lut/I1"]);
    let vcc = nl.get_physical_pins_by_name(GLOBAL_LOGIC1).unwrap().unwrap().to_vec();
    assert_eq!(pin_names(&nl, &vcc), ["VCC/P", "ff_reg[0]/CE"]);
    let gnd2 = nl.get_physical_pins_by_name(GLOBAL_LOGIC0).unwrap().unwrap().to_vec();
    assert_eq!(gnd2, gnd);
}
