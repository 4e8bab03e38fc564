use edifdb::*;
use edifdb::PortDirection::*;

fn name(s: &str) -> NameObj {
    NameObj::new(s.into())
}

fn parent_name(nl: &mut Netlist, net: &str) -> String {
    let n = nl.hier_net_from_name(net).unwrap();
    let p = nl.get_parent_net(&n).unwrap().unwrap();
    p.name(nl).to_string()
}

/// `a[0:1]` feeds two inverters in series, driving `y`.
fn inverter_chain() -> (Netlist, CellId, CellId, InstanceId, InstanceId) {
    let mut nl = Netlist::new("scratch");
    let prims = nl.primitives_library();
    assert_eq!(nl.primitives_library(), prims);
    let work = nl.work_library();
    let inv = nl.add_cell(prims, name("INV")).unwrap();
    nl.add_port(inv, name("I"), Input, 1).unwrap();
    nl.add_port(inv, name("O"), Output, 1).unwrap();

    let top = nl.add_cell(work, name("top")).unwrap();
    nl.add_port(top, NameObj::renamed("a[0:1]".into(), "a".into()), Input, 2).unwrap();
    nl.add_port(top, name("y"), Output, 1).unwrap();
    nl.set_design(name("top"), top);

    let u0 = nl.add_instance(top, name("u0"), inv).unwrap();
    let u1 = nl.add_instance_unique_name(top, "u0", inv).unwrap();
    assert_eq!(&*nl.instance(u1).name, "u0_0");

    let a1 = nl.add_net(top, name("a1")).unwrap();
    nl.connect(a1, None, "a", 1).unwrap();
    nl.connect(a1, Some(u0), "I", -1).unwrap();
    let m = nl.add_net(top, name("m")).unwrap();
    nl.connect(m, Some(u0), "O", -1).unwrap();
    nl.connect(m, Some(u1), "I", -1).unwrap();
    let y = nl.add_net(top, name("y")).unwrap();
    nl.connect(y, Some(u1), "O", -1).unwrap();
    nl.connect(y, None, "y", -1).unwrap();
    (nl, inv, top, u0, u1)
}

#[test]
fn build_from_scratch() {
    clilog::init_stdout_simple_trace();

    let (mut nl, inv, top, u0, _) = inverter_chain();
    assert!(nl.is_primitive(inv));
    assert_eq!(nl.top_cell().unwrap(), top);
    assert_eq!(nl.counts(), (2, 2, 3, 4));

    let a = nl.port(nl.cell(top).port_by_name("a").unwrap());
    assert!(!a.is_little_endian());
    assert_eq!(a.bit_of_index(1), Some(1));
    let a1 = nl.cell(top).nets["a1"];
    assert!(nl.net(a1).port_insts.contains_key("a[1]"));
    assert!(nl.net(a1).port_insts.contains_key("u0/I"));
    assert_eq!(nl.cell(top).internal_nets["a[1]"], a1);
    assert_eq!(nl.instance(u0).port_insts.len(), 2);

    assert_eq!(parent_name(&mut nl, "a1"), "a1");
    assert_eq!(parent_name(&mut nl, "m"), "m");
    assert_eq!(parent_name(&mut nl, "y"), "y");
}

#[test]
fn connect_errors() {
    let (mut nl, inv, top, u0, _) = inverter_chain();
    let a1 = nl.cell(top).nets["a1"];
    assert!(matches!(nl.connect(a1, Some(u0), "I", -1),
                     Err(EdifError::Collision { .. })));
    assert!(matches!(nl.connect(a1, Some(u0), "Z", -1),
                     Err(EdifError::UnresolvedReference { kind: "port", .. })));
    assert!(matches!(nl.connect(a1, None, "a", 1),
                     Err(EdifError::Collision { .. })));

    // an instance of another cell cannot join a net of `top`.
    let work = nl.work_library();
    let other = nl.add_cell(work, name("other")).unwrap();
    let stray = nl.add_instance(other, name("stray"), inv).unwrap();
    assert!(matches!(nl.connect(a1, Some(stray), "I", -1),
                     Err(EdifError::UnresolvedReference { kind: "instance", .. })));
}

#[test]
fn member_out_of_range() {
    let (mut nl, _, top, u0, _) = inverter_chain();
    let n = nl.add_net(top, name("n")).unwrap();
    for index in [2, -2, i32::MAX] {
        assert!(matches!(nl.connect(n, None, "a", index),
                         Err(EdifError::UnresolvedReference { kind: "port member", .. })));
    }
    assert!(matches!(nl.connect(n, Some(u0), "O", 1),
                     Err(EdifError::UnresolvedReference { kind: "port member", .. })));
    assert!(nl.net(n).port_insts.is_empty());
    assert!(!nl.cell(top).internal_nets.contains_key("a[-1]"));

    let pin = nl.connect(n, None, "a", 0).unwrap();
    assert_eq!(&*nl.port_inst(pin).name, "a[0]");
    assert_eq!(nl.port_inst(pin).index, 0);
}

#[test]
fn recursive_instances() {
    let (mut nl, inv, top, _, _) = inverter_chain();
    let work = nl.work_library();
    assert!(matches!(nl.add_instance(top, name("self_loop"), top),
                     Err(EdifError::RecursiveHierarchy { .. })));
    assert!(!nl.cell(top).instances.contains_key("self_loop"));

    // top -> mid -> sub
    let mid = nl.add_cell(work, name("mid")).unwrap();
    let sub = nl.add_cell(work, name("sub")).unwrap();
    let u_mid = nl.add_instance(top, name("u_mid"), mid).unwrap();
    nl.add_instance(mid, name("u_sub"), sub).unwrap();
    assert!(matches!(nl.add_instance(sub, name("u_top"), top),
                     Err(EdifError::RecursiveHierarchy { .. })));
    assert!(matches!(nl.add_instance(sub, name("u_mid"), mid),
                     Err(EdifError::RecursiveHierarchy { .. })));
    nl.add_instance(sub, name("u_inv"), inv).unwrap();

    let leaves = nl.get_all_leaf_descendants(&HierInstance::top(), false).unwrap();
    assert_eq!(leaves.len(), 3);
    assert_eq!(leaves[2].name(&nl), "u_mid/u_sub/u_inv");
    assert_eq!(parent_name(&mut nl, "m"), "m");

    // once u_mid is gone, top may sit below sub, and u_mid cannot
    // come back.
    assert!(nl.remove_instance(u_mid));
    nl.add_instance(sub, name("u_top"), top).unwrap();
    assert!(matches!(nl.insert_instance(u_mid), Err(EdifError::RecursiveHierarchy { .. })));
    assert!(!nl.cell(top).instances.contains_key("u_mid"));
}

#[test]
fn port_edits() {
    let (mut nl, inv, top, u0, u1) = inverter_chain();
    // `a` is the legal name of `a[0:1]`.
    assert!(matches!(nl.add_port(top, name("a"), Input, 1),
                     Err(EdifError::Collision { kind: "port", .. })));
    assert!(matches!(nl.add_port(top, NameObj::renamed("b[1:0]".into(), "y".into()), Input, 2),
                     Err(EdifError::Collision { kind: "port", .. })));
    assert_eq!(nl.cell(top).ports.len(), 2);

    let i_port = nl.cell(inv).port_by_name("I").unwrap();
    assert!(nl.remove_port(i_port));
    assert!(nl.cell(inv).port_by_name("I").is_none());
    assert!(!nl.instance(u0).port_insts.contains_key("I"));
    assert!(!nl.instance(u1).port_insts.contains_key("I"));
    let a1 = nl.cell(top).nets["a1"];
    assert_eq!(nl.net(a1).port_insts.keys().map(|k| &**k).collect::<Vec<_>>(), ["a[1]"]);
    let m = nl.cell(top).nets["m"];
    assert_eq!(nl.net(m).port_insts.keys().map(|k| &**k).collect::<Vec<_>>(), ["u0/O"]);
    assert_eq!(parent_name(&mut nl, "m"), "m");
}

#[test]
fn static_sources_by_name() {
    let (mut nl, inv, top, _, _) = inverter_chain();
    let work = nl.work_library();
    let prims = nl.primitives_library();

    let soft_gnd = nl.add_cell(work, name("GND")).unwrap();
    nl.add_port(soft_gnd, name("G"), Output, 1).unwrap();
    assert!(nl.is_gnd_source(soft_gnd) && !nl.is_vcc_source(soft_gnd));
    assert!(!nl.is_static_source(soft_gnd));
    let vcc = nl.add_cell(prims, name("VCC")).unwrap();
    assert!(nl.is_vcc_source(vcc) && nl.is_static_source(vcc));
    assert!(!nl.is_static_source(inv));

    // a GND outside the primitives library drives an ordinary net.
    let g = nl.add_instance(top, name("g"), soft_gnd).unwrap();
    let u2 = nl.add_instance(top, name("u2"), inv).unwrap();
    let low = nl.add_net(top, name("low")).unwrap();
    nl.connect(low, Some(g), "G", -1).unwrap();
    nl.connect(low, Some(u2), "I", -1).unwrap();
    assert_eq!(parent_name(&mut nl, "low"), "low");
    assert!(nl.get_global_ground_pins().unwrap().is_empty());
}

#[test]
fn multiple_drivers() {
    let (mut nl, inv, top, _, _) = inverter_chain();
    assert_eq!(parent_name(&mut nl, "m"), "m");

    let m = nl.cell(top).nets["m"];
    let u2 = nl.add_instance(top, name("u2"), inv).unwrap();
    let pin = nl.connect(m, Some(u2), "O", -1).unwrap();
    let n = nl.hier_net_from_name("m").unwrap();
    assert!(matches!(nl.get_parent_net(&n), Err(EdifError::MultipleSources { .. })));

    assert!(nl.disconnect(pin));
    assert!(!nl.disconnect(pin));
    assert_eq!(parent_name(&mut nl, "m"), "m");

    let floating = nl.add_net(top, name("floating")).unwrap();
    nl.connect(floating, Some(u2), "I", -1).unwrap();
    let f = nl.hier_net_from_name("floating").unwrap();
    assert!(matches!(nl.net_aliases(&f), Err(EdifError::UndrivenNet { .. })));
    let empty = nl.add_net(top, name("empty")).unwrap();
    let aliases = nl.net_aliases(&HierNet::new(HierInstance::top(), empty)).unwrap();
    assert!(aliases.parent.is_none());
}

#[test]
fn collisions() {
    let (mut nl, _, top, u0, u1) = inverter_chain();
    let work = nl.work_library();
    let m = nl.cell(top).nets["m"];

    assert!(matches!(nl.add_net(top, name("m")), Err(EdifError::Collision { .. })));
    nl.insert_net(m).unwrap();
    assert!(matches!(nl.add_cell(work, name("top")), Err(EdifError::Collision { .. })));
    nl.insert_cell(work, top).unwrap();
    nl.insert_instance(u0).unwrap();
    assert!(matches!(nl.add_instance(top, name("u0"), top), Err(EdifError::Collision { .. })));
    assert!(matches!(nl.add_port(top, name("y"), Output, 1), Err(EdifError::Collision { .. })));
    assert!(matches!(nl.add_port(top, name("b"), Input, 4),
                     Err(EdifError::InvalidBusName { .. })));
    assert!(matches!(nl.add_library(name(WORK_LIBRARY), false),
                     Err(EdifError::Collision { .. })));
    assert!(matches!(nl.rename_instance(u0, name("u0_0")),
                     Err(EdifError::Collision { .. })));
    assert_eq!(&*nl.instance(u1).name, "u0_0");
}

#[test]
fn rename_and_remove() {
    let (mut nl, inv, top, u0, u1) = inverter_chain();
    let m = nl.cell(top).nets["m"];

    nl.rename_instance(u0, NameObj::renamed("u[0]".into(), "u_0_".into())).unwrap();
    assert_eq!(nl.cell(top).instances.get_index_of("u[0]"), Some(0));
    assert!(nl.cell(top).instances.get("u0").is_none());
    assert_eq!(&*nl.legal_name(EntityRef::Instance(u0)), "u_0_");
    let keys = nl.net(m).port_insts.keys().map(|k| &**k).collect::<Vec<_>>();
    assert_eq!(keys, ["u[0]/O", "u0_0/I"]);
    assert_eq!(parent_name(&mut nl, "m"), "m");

    assert_eq!(nl.set_property(EntityRef::Instance(u0), "INIT",
                               PropertyValue::string("2'h1".into())).unwrap(), None);
    let old = nl.set_property(EntityRef::Instance(u0), "INIT",
                              PropertyValue::string("2'h2".into())).unwrap();
    assert_eq!(old.as_ref().map(|v| &*v.value), Some("2'h1"));
    let y_port = nl.cell(top).port_by_name("y").unwrap();
    assert_eq!(nl.set_property(EntityRef::Port(y_port), "IO_BUFFER_TYPE",
                               PropertyValue::string("NONE".into())).unwrap(), None);
    assert_eq!(&*nl.port(y_port).properties["IO_BUFFER_TYPE"].value, "NONE");
    assert!(matches!(nl.set_property(EntityRef::Library(LibraryId(0)), "X",
                                     PropertyValue::string("1".into())),
                     Err(EdifError::UnresolvedReference { .. })));
    nl.set_property(EntityRef::Design, "PART", PropertyValue::string("xc7a35t".into())).unwrap();
    assert_eq!(nl.part_name(), Some("xc7a35t"));

    assert!(nl.remove_instance(u1));
    assert!(!nl.remove_instance(u1));
    assert_eq!(nl.net(m).port_insts.len(), 1);
    let y = nl.cell(top).nets["y"];
    assert_eq!(nl.net(y).port_insts.len(), 1);
    assert!(nl.hier_net_from_name("y").is_some());

    let y_port = nl.cell(top).port_by_name("y").unwrap();
    assert!(nl.remove_port(y_port));
    assert!(!nl.remove_port(y_port));
    assert!(nl.net(y).port_insts.is_empty());
    assert!(!nl.cell(top).internal_nets.contains_key("y"));

    assert!(nl.remove_net(m));
    assert!(!nl.remove_net(m));
    assert!(!nl.instance(u0).port_insts.contains_key("O"));

    nl.make_primitive(top);
    assert!(nl.cell(top).is_leaf_or_black_box());
    assert_eq!(nl.cell(top).ports.len(), 1);
    assert!(nl.cell(top).internal_nets.is_empty());

    let prims = nl.primitives_library();
    assert!(nl.remove_cell(inv));
    assert!(!nl.remove_cell(inv));
    assert!(nl.library(prims).cells.is_empty());
}

#[test]
fn rename_duplicate_cells() {
    let (mut nl, _, _, _, _) = inverter_chain();
    let prims = nl.primitives_library();
    let work = nl.work_library();

    let dup = nl.add_cell(work, name("INV")).unwrap();
    nl.add_cell_rename_duplicates(prims, dup, None).unwrap();
    assert_eq!(&*nl.cell(dup).name, "INV_RW_collisionRename");
    assert_eq!(nl.cell(dup).library, prims);
    assert_eq!(nl.cell_by_name(PRIMITIVES_LIBRARY, "INV_RW_collisionRename"), Some(dup));
    assert!(nl.cell_by_name(WORK_LIBRARY, "INV").is_none());

    let dup2 = nl.add_cell(work, name("INV")).unwrap();
    nl.add_cell_rename_duplicates(prims, dup2, None).unwrap();
    assert_eq!(&*nl.cell(dup2).name, "INV_RW_collisionRename_0");

    let dup3 = nl.add_cell(work, name("INV")).unwrap();
    nl.add_cell_rename_duplicates(prims, dup3, Some("eco")).unwrap();
    assert_eq!(&*nl.cell(dup3).name, "INV_RW_eco");

    // no collision: moved as is.
    let fresh = nl.add_cell(work, name("BUF")).unwrap();
    nl.add_cell_rename_duplicates(prims, fresh, Some(DEFAULT_COLLISION_SUFFIX)).unwrap();
    assert_eq!(nl.cell_by_name(PRIMITIVES_LIBRARY, "BUF"), Some(fresh));
}

#[test]
fn build_errors() {
    fn wrap(libs: &str) -> String {
        format!("(edif t (edifversion 2 0 0) (edifLevel 0) (keywordmap (keywordlevel 0))
  (library work (edifLevel 0) (technology (numberDefinition))
    {}))", libs)
    }
    fn cell(name: &str, ports: &str, contents: &str) -> String {
        format!("(cell {} (celltype GENERIC) (view netlist (viewtype NETLIST)
      (interface {}) {}))", name, ports, contents)
    }

    let recursive = wrap(&format!(
        "{} {}",
        cell("a", "", "(contents (instance ub (viewref netlist (cellref b))))"),
        cell("b", "", "(contents (instance ua (viewref netlist (cellref a))))")));
    assert!(matches!(Netlist::from_edif_str(&recursive),
                     Err(EdifError::RecursiveHierarchy { .. })));

    let missing_cell = wrap(&cell(
        "a", "", "(contents (instance u (viewref netlist (cellref nope (libraryref work)))))"));
    assert!(matches!(Netlist::from_edif_str(&missing_cell),
                     Err(EdifError::UnresolvedReference { kind: "cell", .. })));

    let missing_port = wrap(&format!(
        "{} {}",
        cell("leaf", "(port I (direction INPUT))", ""),
        cell("a", "", "(contents (instance u (viewref netlist (cellref leaf)))
                         (net n (joined (portref Z (instanceref u)))))")));
    assert!(matches!(Netlist::from_edif_str(&missing_port),
                     Err(EdifError::UnresolvedReference { kind: "port", .. })));

    let bad_bus = wrap(&cell("a", "(port (array d 4) (direction INPUT))", ""));
    assert!(matches!(Netlist::from_edif_str(&bad_bus),
                     Err(EdifError::InvalidBusName { .. })));

    let wide_member = wrap(&cell("a", "(port (array (rename d \"d[1:0]\") 2) (direction INPUT))",
                                 "(contents (net n (joined (portref (member d 5)))))"));
    assert!(matches!(Netlist::from_edif_str(&wide_member),
                     Err(EdifError::UnresolvedReference { kind: "port member", .. })));

    let dup_port = wrap(&cell("a", "(port d (direction INPUT)) (port d (direction OUTPUT))", ""));
    assert!(matches!(Netlist::from_edif_str(&dup_port),
                     Err(EdifError::Collision { kind: "port", .. })));

    let dup_net = wrap(&cell("a", "(port I (direction INPUT))",
                             "(contents (net n (joined (portref I))) (net n (joined)))"));
    assert!(matches!(Netlist::from_edif_str(&dup_net),
                     Err(EdifError::Collision { kind: "net", .. })));

    let no_design = Netlist::from_edif_str(&wrap(&cell("a", "", ""))).unwrap();
    assert!(matches!(no_design.top_cell(), Err(EdifError::MissingDesign)));

    assert!(matches!(Netlist::from_edif_str("(edif t"), Err(EdifError::Parse(_))));
}
