use edifdb::*;
use edifdb::PortDirection::*;

const HIER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/hier.edf");

fn load() -> Netlist {
    Netlist::from_edif_file(HIER, &ParserConfig::default()).unwrap()
}

fn parent_name(nl: &mut Netlist, net: &str) -> String {
    let n = nl.hier_net_from_name(net).unwrap();
    let p = nl.get_parent_net(&n).unwrap().unwrap();
    p.name(nl).to_string()
}

#[test]
fn remove_unused_cells() {
    clilog::init_stdout_simple_trace();

    let mut nl = load();
    let counts = nl.counts();
    let work = nl.library_by_name(WORK_LIBRARY).unwrap();
    nl.add_cell(work, NameObj::new("spare".into())).unwrap();
    let ip = nl.add_library(NameObj::new("ip".into()), false).unwrap();
    let orphan = nl.add_cell(ip, NameObj::new("orphan".into())).unwrap();
    let used = nl.add_cell(ip, NameObj::new("used".into())).unwrap();
    let top = nl.top_cell().unwrap();
    nl.add_instance(top, NameObj::new("u_used".into()), used).unwrap();

    assert_eq!(nl.remove_unused_cells_from_work_library().unwrap(), 1);
    assert!(nl.cell_by_name(WORK_LIBRARY, "spare").is_none());
    assert_eq!(nl.cell_by_name("ip", "orphan"), Some(orphan));

    assert_eq!(nl.remove_unused_cells_from_all_work_libraries().unwrap(), 1);
    assert!(nl.cell_by_name("ip", "orphan").is_none());
    assert_eq!(nl.cell_by_name("ip", "used"), Some(used));
    // primitives are never pruned.
    assert_eq!(nl.library(nl.library_by_name(PRIMITIVES_LIBRARY).unwrap()).cells.len(), 6);
    assert_eq!(nl.remove_unused_cells_from_all_work_libraries().unwrap(), 0);

    let removed = nl.cell(top).instances["u_used"];
    assert!(nl.remove_instance(removed));
    assert_eq!(nl.remove_unused_cells_from_all_work_libraries().unwrap(), 1);
    assert_eq!(nl.counts(), counts);

    let mut empty = Netlist::new("empty");
    assert_eq!(empty.remove_unused_cells_from_work_library().unwrap(), 0);
    empty.work_library();
    assert!(matches!(empty.remove_unused_cells_from_work_library(),
                     Err(EdifError::MissingDesign)));
}

#[test]
fn migrate_cells() {
    let mut src = load();
    let mut dst = Netlist::new("dst");
    let prims = dst.primitives_library();
    let lut2 = dst.add_cell(prims, NameObj::new("LUT2".into())).unwrap();
    dst.add_port(lut2, NameObj::new("O".into()), Output, 1).unwrap();
    dst.add_port(lut2, NameObj::new("I0".into()), Input, 1).unwrap();
    dst.add_port(lut2, NameObj::new("I1".into()), Input, 1).unwrap();

    let stage = src.cell_by_name(WORK_LIBRARY, "inv_stage").unwrap();
    let moved = dst.migrate_cell_and_sub_cells(&mut src, stage, false).unwrap();
    assert_eq!(dst.cell_by_name(WORK_LIBRARY, "inv_stage"), Some(moved));
    assert!(src.cell_by_name(WORK_LIBRARY, "inv_stage").is_none());
    // the existing primitive stands in for the source one.
    assert!(src.cell_by_name(PRIMITIVES_LIBRARY, "LUT2").is_some());
    let lut = dst.cell(moved).instances["lut"];
    assert_eq!(dst.instance(lut).cell_type, lut2);
    assert_eq!(&*dst.instance(lut).properties["INIT"].value, "4'h1");

    let sel = dst.cell(moved).port_by_name("sel").unwrap();
    assert_eq!(&*dst.legal_name(EntityRef::Port(sel)), "sel");
    assert_eq!(dst.port(sel).width, 2);
    let s1 = dst.cell(moved).nets["s1"];
    let keys = dst.net(s1).port_insts.keys().map(|k| &**k).collect::<Vec<_>>();
    assert_eq!(keys, ["sel[1]", "lut/I1"]);
}

#[test]
fn migrate_uniquified() {
    let mut dst = load();
    let mut src = load();
    let src_top = src.top_cell().unwrap();
    let top = dst.migrate_cell_and_sub_cells(&mut src, src_top, true).unwrap();
    assert_eq!(&*dst.cell(top).name, "top_parameterized0");
    assert_eq!(&*dst.cell(top).view, "top_parameterized0");

    let u_inv = dst.cell(top).instances["u_inv"];
    let stage = dst.instance(u_inv).cell_type;
    assert_eq!(&*dst.cell(stage).name, "inv_stage_parameterized0");
    assert_eq!(&*dst.instance(u_inv).view, "inv_stage_parameterized0");
    // a shared sub cell is moved once.
    let u_inv2 = dst.cell(top).instances["u_inv2"];
    assert_eq!(dst.instance(u_inv2).cell_type, stage);
    // primitives are reused, never renamed.
    let prims = dst.library_by_name(PRIMITIVES_LIBRARY).unwrap();
    assert_eq!(dst.library(prims).cells.len(), 6);
    assert_eq!(src.library(src.library_by_name(PRIMITIVES_LIBRARY).unwrap()).cells.len(), 6);
    assert!(src.library(src.library_by_name(WORK_LIBRARY).unwrap()).cells.is_empty());

    let clk = dst.port(dst.cell(top).port_by_name("clk").unwrap());
    assert_eq!(&*clk.properties["CLOCK_BUFFER_TYPE"].value, "BUFG");

    dst.set_design(NameObj::new("copy".into()), top);
    assert_eq!(parent_name(&mut dst, "u_inv2/a"), "u_inv/y");
    assert_eq!(parent_name(&mut dst, "u_inv2/s1"), "<const0>");
    assert_eq!(dst.get_global_ground_pins().unwrap().len(), 4);
    assert_eq!(dst.remove_unused_cells_from_work_library().unwrap(), 2);
}

#[test]
fn rename_top() {
    let mut nl = load();
    let top = nl.top_cell().unwrap();
    let work = nl.library_by_name(WORK_LIBRARY).unwrap();

    nl.rename_netlist_and_top_cell("top_v2").unwrap();
    assert_eq!(&*nl.name, "top_v2");
    assert_eq!(&*nl.design.as_ref().unwrap().name, "top_v2");
    assert_eq!(nl.cell_by_name(WORK_LIBRARY, "top_v2"), Some(top));
    assert!(nl.cell_by_name(WORK_LIBRARY, "top").is_none());
    assert_eq!(nl.library(work).cells.get_index_of("top_v2"), Some(1));

    nl.rename_netlist_and_top_cell("my top").unwrap();
    assert_eq!(&*nl.cell(top).name, "my top");
    assert_eq!(&*nl.legal_name(EntityRef::Cell(top)), "my_top");
    assert_eq!(nl.cell_by_name(WORK_LIBRARY, "my_top"), Some(top));

    let mut buf = Vec::new();
    nl.export_edif(&mut buf, &WriterConfig::default()).unwrap();
    let back = Netlist::from_edif_str(&String::from_utf8(buf).unwrap()).unwrap();
    assert_eq!(back.canonical_summary(), nl.canonical_summary());
    assert_eq!(&*back.cell(back.top_cell().unwrap()).name, "my top");

    assert!(matches!(nl.rename_netlist_and_top_cell("inv_stage"),
                     Err(EdifError::Collision { kind: "cell", .. })));
    assert!(matches!(Netlist::new("x").rename_netlist_and_top_cell("y"),
                     Err(EdifError::MissingDesign)));
}
