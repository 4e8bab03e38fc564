use edifdb::{ Netlist, ParserConfig, HierInstance };
use std::env;

fn main() {
    clilog::init_stderr_color_debug();
    clilog::enable_timer("edifdb");
    clilog::enable_timer("edifparse");
    let args: Vec<String> = env::args().collect();
    assert!(args.len() == 2 || args.len() == 3,
            "Usage: {} <edif_path> [<binary_output>]", args[0]);

    let mut db = Netlist::from_edif_file(&args[1], &ParserConfig::from_env())
        .expect("Error parsing the edif into netlist");

    let (cells, instances, nets, ports) = db.counts();
    println!("Netlist statistics for {}", args[1]);
    println!("design:        {}", db.name);
    println!("part:          {}", db.part_name().unwrap_or("(none)"));
    println!("num libraries: {}", db.libraries.len());
    println!("num cells:     {}", cells);
    println!("num instances: {}", instances);
    println!("num nets:      {}", nets);
    println!("num ports:     {}", ports);

    let leaves = db.get_all_leaf_descendants(&HierInstance::top(), true)
        .expect("Error walking the hierarchy");
    println!("num leaf instances: {}", leaves.len());
    let gnd = db.get_global_ground_pins().expect("Error resolving nets").len();
    let vcc = db.get_global_power_pins().expect("Error resolving nets").len();
    println!("num GND pins:  {}", gnd);
    println!("num VCC pins:  {}", vcc);

    if let Some(out) = args.get(2) {
        db.write_binary_file(out).expect("Error writing binary netlist");
        println!("binary netlist written to {}", out);
    }
}
