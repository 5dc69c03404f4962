//! Demand-paging simulator.
//!
//! Reads a binary stream of process records (pid, reference count, page
//! numbers), replays the reference strings round-robin against a fixed
//! physical memory through a flat or two-level page table, and prints the
//! per-access trace followed by per-process and total statistics.

use std::process;

use clap::{App, Arg};
use log::info;

use rust_demand_paging::io::{load_processes, load_processes_from_file};
use rust_demand_paging::logging;
use rust_demand_paging::report::{self, ConsoleTrace};
use rust_demand_paging::simulator::Simulator;
use rust_demand_paging::translation::TableKind;

fn main() {
    logging::init();

    let matches = App::new("rust-demand-paging")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Replays per-process page reference strings against a small fixed physical memory")
        .arg(
            Arg::with_name("two-level")
                .short("t")
                .long("two-level")
                .help("Use a two-level page table instead of the flat one"),
        )
        .arg(
            Arg::with_name("INPUT")
                .help("Binary reference file; stdin when absent or '-'")
                .index(1),
        )
        .get_matches();

    let kind = if matches.is_present("two-level") {
        TableKind::TwoLevel
    } else {
        TableKind::Flat
    };

    if let Err(e) = run(kind, matches.value_of("INPUT")) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(kind: TableKind, input: Option<&str>) -> Result<(), String> {
    let images = match input {
        Some(path) if path != "-" => load_processes_from_file(path)?,
        _ => load_processes(&mut std::io::stdin().lock())?,
    };
    info!("loaded {} processes", images.len());
    report::print_loaded(&images);

    let mut sim = Simulator::new(kind);
    for image in images {
        if sim.admit(image).is_err() {
            // Even a failed admission leaves reportable state behind
            println!("Out of memory!!");
            report::print_report(&sim);
            return Err("out of memory while admitting processes".to_string());
        }
    }

    let mut trace = ConsoleTrace;
    let outcome = sim.run(&mut trace);

    // The report always covers whatever state the replay reached
    report::print_report(&sim);

    outcome.map_err(|e| e.to_string())
}
