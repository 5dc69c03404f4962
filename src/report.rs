use std::fmt::Write as _;

use crate::constants::*;
use crate::simulator::{AccessEvent, ProcessImage, Simulator, TraceSink};
use crate::translation::{PageTable, Translation};

/// Render one trace line for a translation
pub fn format_access(event: &AccessEvent) -> String {
    match event.translation {
        Translation::Flat(access) => {
            if access.fault {
                format!(
                    "[PID {:02} IDX:{:03}] {:03} Page access: PF -> Allocated Frame {:03}",
                    event.pid, event.index, event.vpn, access.frame
                )
            } else {
                format!(
                    "[PID {:02} IDX:{:03}] {:03} Page access: Frame {:03}",
                    event.pid, event.index, event.vpn, access.frame
                )
            }
        }
        Translation::TwoLevel { table, page } => {
            let l1_idx = event.vpn as usize / L2_ENTRIES;
            let level1 = if table.fault {
                format!("PF -> Allocated Frame {:03}(PTE {:03})", table.frame, l1_idx)
            } else {
                format!("Frame {:03}", table.frame)
            };
            let level2 = if page.fault {
                format!("PF -> Allocated Frame {:03}", page.frame)
            } else {
                format!("Frame {:03}", page.frame)
            };
            format!(
                "[PID {:02} IDX:{:03}] Page access {:03}: (L1PT) {}, (L2PT) {}",
                event.pid, event.index, event.vpn, level1, level2
            )
        }
    }
}

/// Trace sink that prints each access as it happens
pub struct ConsoleTrace;

impl TraceSink for ConsoleTrace {
    fn access(&mut self, event: &AccessEvent) {
        println!("{}", format_access(event));
    }

    fn out_of_memory(&mut self) {
        println!("Out of memory!!");
    }
}

/// Render a loaded record the way it is echoed after parsing: the header
/// line, then the zero-padded reference list
pub fn format_image(image: &ProcessImage) -> String {
    let references: Vec<String> = image
        .references
        .iter()
        .map(|vpn| format!("{:02}", vpn))
        .collect();
    format!("{} {}\n{}", image.pid, image.references.len(), references.join(" "))
}

/// Echo every loaded record to stdout
pub fn print_loaded(images: &[ProcessImage]) {
    for image in images {
        println!("{}", format_image(image));
    }
}

/// Render the end-of-run report: per process a summary line and the dump of
/// its valid mappings, then the run totals
pub fn format_report(sim: &Simulator) -> String {
    let stats = sim.statistics();
    let mut out = String::new();

    for (ctx, process) in sim.processes().iter().zip(&stats.per_process) {
        writeln!(
            out,
            "** Process {:03}: Allocated Frames={:03} PageFaults/References={:03}/{:03}",
            process.pid, process.allocated_frames, process.fault_count, process.processed_count
        )
        .unwrap();

        match ctx.page_table() {
            PageTable::Flat(table) => {
                for (vpn, pte) in table.entries(sim.memory()) {
                    writeln!(
                        out,
                        "[PAGE] {:03} -> [FRAME] {:03} REF={:03}",
                        vpn, pte.frame, pte.ref_count
                    )
                    .unwrap();
                }
            }
            PageTable::TwoLevel(table) => {
                for (l1, table_frame) in table.level1(sim.memory()) {
                    writeln!(out, "(L1PT) [PTE] {:03} -> [FRAME] {:03}", l1, table_frame).unwrap();
                    for (l2, pte) in table.level2(sim.memory(), table_frame) {
                        let vpn = l1 * L2_ENTRIES + l2;
                        writeln!(
                            out,
                            "(L2PT) [PAGE] {:03} -> [FRAME] {:03} REF={:03}",
                            vpn, pte.frame, pte.ref_count
                        )
                        .unwrap();
                    }
                }
            }
        }
    }

    write!(
        out,
        "Total: Allocated Frames={:03} Page Faults/References={:03}/{:03}",
        stats.totals.allocated_frames, stats.totals.fault_count, stats.totals.processed_count
    )
    .unwrap();
    out
}

pub fn print_report(sim: &Simulator) {
    println!("{}", format_report(sim));
}
