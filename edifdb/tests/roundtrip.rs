use edifdb::*;
use edifdb::PortDirection::*;
use pretty_assertions::assert_eq;

const HIER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/hier.edf");

fn load() -> Netlist {
    Netlist::from_edif_file(HIER, &ParserConfig::default()).unwrap()
}

fn export(nl: &Netlist, stable: bool) -> String {
    let mut buf = Vec::new();
    nl.export_edif(&mut buf, &WriterConfig { stable }).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn binary_round_trip() {
    clilog::init_stdout_simple_trace();

    let nl = load();
    let mut buf = Vec::new();
    nl.encode(&mut buf).unwrap();
    let back = Netlist::decode(&buf[..]).unwrap();
    assert_eq!(back.canonical_summary(), nl.canonical_summary());
    assert_eq!(back.counts(), nl.counts());
    assert!(back.status.is_none());
    assert_eq!(back.comments, nl.comments);

    let top = back.top_cell().unwrap();
    let clk = back.port(back.cell(top).port_by_name("clk").unwrap());
    assert_eq!(&*clk.properties["CLOCK_BUFFER_TYPE"].value, "BUFG");
    let ff = *back.cell(top).instances.get("ff_reg[0]").unwrap();
    assert_eq!(&*back.legal_name(EntityRef::Instance(ff)), "ff_reg_0_");
    assert_eq!(back.part_name(), Some("xc7a35tcpg236-1"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hier.bin.gz");
    nl.write_binary_file(&path).unwrap();
    let from_file = Netlist::read_binary_file(&path).unwrap();
    assert_eq!(from_file.canonical_summary(), nl.canonical_summary());
}

#[test]
fn binary_format_errors() {
    let nl = load();
    let mut buf = Vec::new();
    nl.encode(&mut buf).unwrap();

    let mut wrong_version = buf.clone();
    let off = 4 + BINARY_FORMAT_TAG.len() + 4;
    wrong_version[off..off + BINARY_FORMAT_VERSION.len()].copy_from_slice(b"9.9.9");
    match Netlist::decode(&wrong_version[..]) {
        Err(EdifError::BinaryFormatMismatch { expected, found }) => {
            assert_eq!(expected, BINARY_FORMAT_VERSION);
            assert_eq!(found, "9.9.9");
        }
        r => panic!("unexpected result {:?}", r.map(|n| n.counts()))
    }

    let mut wrong_tag = buf.clone();
    wrong_tag[4] = b'X';
    assert!(matches!(Netlist::decode(&wrong_tag[..]),
                     Err(EdifError::BinaryFormatMismatch { .. })));

    assert!(matches!(Netlist::decode(&buf[..buf.len() / 2]),
                     Err(EdifError::BinaryFormat(_))));
    assert!(matches!(Netlist::decode(&b"EDIF"[..]),
                     Err(EdifError::BinaryFormat(_))));
}

#[test]
fn text_round_trip() {
    let nl = load();
    for stable in [false, true] {
        let text = export(&nl, stable);
        let back = Netlist::from_edif_str(&text).unwrap();
        assert_eq!(back.canonical_summary(), nl.canonical_summary());
        assert_eq!(back.status, nl.status);
        assert_eq!(back.comments, nl.comments);
    }

    let text = export(&nl, true);
    assert!(text.contains("(rename ff_reg_0_ \"ff_reg[0]\")"));
    assert!(text.contains("(array (rename q \"q[3:0]\") 4)"));
    assert!(text.contains("(portref (member q 3))"));
    assert!(text.contains("(instanceref ff_reg_0_)"));
    assert!(text.contains("(property PART (string \"xc7a35tcpg236-1\") (owner \"Xilinx\"))"));
    assert!(text.contains("          (port clk (direction INPUT)\n            \
                           (property CLOCK_BUFFER_TYPE (string \"BUFG\"))\n          )\n"));
    let back = Netlist::from_edif_str(&text).unwrap();
    assert_eq!(export(&back, true), text);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hier_out.edf.gz");
    nl.write_edif_file(&path, &WriterConfig::default()).unwrap();
    let from_file = Netlist::from_edif_file(&path, &ParserConfig::default()).unwrap();
    assert_eq!(from_file.canonical_summary(), nl.canonical_summary());
}

#[test]
fn writer_legalizes_names() {
    let mut nl = Netlist::new("legal");
    let prims = nl.primitives_library();
    let work = nl.work_library();
    let buf = nl.add_cell(prims, NameObj::new("BUF".into())).unwrap();
    nl.add_port(buf, NameObj::new("I".into()), Input, 1).unwrap();
    nl.add_port(buf, NameObj::new("O".into()), Output, 1).unwrap();

    let blk = nl.add_cell(work, NameObj::new("blk".into())).unwrap();
    nl.add_port(blk, NameObj::new("d".into()), Input, 1).unwrap();
    nl.add_port(blk, NameObj::new("d[1:0]".into()), Input, 2).unwrap();
    nl.add_port(blk, NameObj::new("y".into()), Output, 1).unwrap();
    nl.set_design(NameObj::new("blk".into()), blk);

    let u = nl.add_instance(blk, NameObj::new("u[3]".into()), buf).unwrap();
    let n = nl.add_net(blk, NameObj::new("n/1".into())).unwrap();
    nl.connect(n, None, "d[1:0]", 1).unwrap();
    nl.connect(n, Some(u), "I", -1).unwrap();
    let y = nl.add_net(blk, NameObj::new("y".into())).unwrap();
    nl.connect(y, Some(u), "O", -1).unwrap();
    nl.connect(y, None, "y", -1).unwrap();
    let dn = nl.add_net(blk, NameObj::new("dn".into())).unwrap();
    nl.connect(dn, None, "d", -1).unwrap();

    let text = export(&nl, false);
    assert!(text.contains("(array (rename d_BUS_ \"d[1:0]\") 2)"));
    assert!(text.contains("(port d (direction INPUT))"));
    assert!(text.contains("(portref (member d_BUS_ 1))"));
    assert!(text.contains("(rename n_1 \"n/1\")"));
    assert!(text.contains("(rename u_3_ \"u[3]\")"));
    assert!(text.contains("(instanceref u_3_)"));

    let back = Netlist::from_edif_str(&text).unwrap();
    assert_eq!(back.canonical_summary(), nl.canonical_summary());
    let top = back.top_cell().unwrap();
    let n = back.cell(top).nets["n/1"];
    assert!(back.net(n).port_insts.contains_key("d[0]"));
    assert!(back.net(n).port_insts.contains_key("u[3]/I"));
}

#[test]
fn libraries_in_dependency_order() {
    let mut nl = Netlist::new("order");
    let work = nl.work_library();
    let top = nl.add_cell(work, NameObj::new("top".into())).unwrap();
    nl.set_design(NameObj::new("top".into()), top);
    let ip = nl.add_library(NameObj::new("ip".into()), false).unwrap();
    let core = nl.add_cell(ip, NameObj::new("core".into())).unwrap();
    let prims = nl.primitives_library();
    let buf = nl.add_cell(prims, NameObj::new("BUF".into())).unwrap();
    nl.add_instance(top, NameObj::new("u_core".into()), core).unwrap();
    nl.add_instance(core, NameObj::new("u_buf".into()), buf).unwrap();

    assert_eq!(nl.libraries_in_export_order(false).unwrap(), [prims, ip, work]);
    for stable in [false, true] {
        let text = export(&nl, stable);
        let at = |lib: &str| text.find(&format!("(Library {}\n", lib)).unwrap();
        assert!(at(PRIMITIVES_LIBRARY) < at("ip"));
        assert!(at("ip") < at(WORK_LIBRARY));
        let back = Netlist::from_edif_str(&text).unwrap();
        assert_eq!(back.canonical_summary(), nl.canonical_summary());
    }

    // work -> ip -> work
    let leaf = nl.add_cell(work, NameObj::new("leaf".into())).unwrap();
    nl.add_instance(core, NameObj::new("u_leaf".into()), leaf).unwrap();
    assert!(matches!(nl.libraries_in_export_order(true),
                     Err(EdifError::CircularLibraries { .. })));
    let mut buf = Vec::new();
    assert!(matches!(nl.export_edif(&mut buf, &WriterConfig::default()),
                     Err(EdifError::CircularLibraries { .. })));
}
