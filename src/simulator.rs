use log::{debug, info, warn};

use crate::constants::*;
use crate::memory::{FrameAllocator, OutOfMemory, PhysicalMemory};
use crate::translation::{PageTable, TableKind, TranslateError, Translation};

/// One input record: a process identity and the pages it will touch, in
/// order. Identities are opaque and duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessImage {
    pub pid: i32,
    pub references: Vec<u8>,
}

/// Per-process replay state. Built at admission, mutated only by the
/// simulator, and kept alive after the run for reporting.
pub struct ProcessContext {
    pid: i32,
    references: Vec<u8>,
    cursor: usize,
    page_table: PageTable,
    fault_count: u32,
    processed_count: u32,
}

impl ProcessContext {
    #[inline]
    pub fn pid(&self) -> i32 {
        self.pid
    }

    #[inline]
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    fn finished(&self) -> bool {
        self.cursor >= self.references.len()
    }
}

/// One translation, as reported to the output collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEvent {
    pub pid: i32,
    /// Position within the process's own reference sequence
    pub index: usize,
    pub vpn: u8,
    pub translation: Translation,
}

/// Consumer of the replay trace, fed in strict chronological order
pub trait TraceSink {
    fn access(&mut self, event: &AccessEvent);

    /// Terminal signal: the replay aborted because frame space ran out
    fn out_of_memory(&mut self) {}
}

/// Collecting sink, mostly for tests
impl TraceSink for Vec<AccessEvent> {
    fn access(&mut self, event: &AccessEvent) {
        self.push(*event);
    }
}

/// Statistics for one process after replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    pub pid: i32,
    /// Table-structural frames plus valid data pages
    pub allocated_frames: usize,
    pub fault_count: u32,
    pub processed_count: u32,
}

/// Run-wide totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    /// Every frame the allocator handed out, tables included
    pub allocated_frames: usize,
    pub fault_count: u32,
    pub processed_count: u32,
}

#[derive(Debug, Clone)]
pub struct SimulationStats {
    pub per_process: Vec<ProcessStats>,
    pub totals: Totals,
}

/// Replays the admitted processes' reference strings round-robin against
/// one shared physical memory.
pub struct Simulator {
    memory: PhysicalMemory,
    allocator: FrameAllocator,
    kind: TableKind,
    processes: Vec<ProcessContext>,
}

impl Simulator {
    pub fn new(kind: TableKind) -> Self {
        Self::with_frames(kind, FRAME_COUNT)
    }

    /// Build a simulator over a non-default arena size
    pub fn with_frames(kind: TableKind, frame_count: usize) -> Self {
        Simulator {
            memory: PhysicalMemory::with_frames(frame_count),
            allocator: FrameAllocator::with_capacity(frame_count),
            kind,
            processes: Vec::new(),
        }
    }

    /// Create the process's context and reserve its table-structural frames.
    /// On failure the process is not admitted, but frames already consumed
    /// by earlier admissions stay allocated.
    pub fn admit(&mut self, image: ProcessImage) -> Result<(), OutOfMemory> {
        let page_table = PageTable::new(self.kind, &mut self.memory, &mut self.allocator)?;
        debug!(
            "admitted process {} with {} references",
            image.pid,
            image.references.len()
        );
        self.processes.push(ProcessContext {
            pid: image.pid,
            references: image.references,
            cursor: 0,
            page_table,
            fault_count: 0,
            processed_count: 0,
        });
        Ok(())
    }

    /// Round-robin replay: each sweep services one pending reference per
    /// process, in admission order, until every sequence is drained.
    ///
    /// A failed translation aborts the whole replay; counters and the trace
    /// then cover exactly the references completed before the abort.
    pub fn run(&mut self, sink: &mut dyn TraceSink) -> Result<(), TranslateError> {
        info!("replay start: {} processes", self.processes.len());
        loop {
            let mut pending = false;
            for i in 0..self.processes.len() {
                if self.processes[i].finished() {
                    continue;
                }
                pending = true;

                let index = self.processes[i].cursor;
                let vpn = self.processes[i].references[index];
                let outcome = {
                    let ctx = &self.processes[i];
                    ctx.page_table
                        .translate(vpn as usize, &mut self.memory, &mut self.allocator)
                };
                match outcome {
                    Ok(translation) => {
                        let ctx = &mut self.processes[i];
                        ctx.fault_count += translation.fault_count();
                        ctx.processed_count += 1;
                        ctx.cursor += 1;
                        sink.access(&AccessEvent {
                            pid: ctx.pid,
                            index,
                            vpn,
                            translation,
                        });
                    }
                    Err(error) => {
                        warn!(
                            "replay aborted at process {} reference {}: {}",
                            self.processes[i].pid, index, error
                        );
                        if error == TranslateError::OutOfMemory {
                            sink.out_of_memory();
                        }
                        return Err(error);
                    }
                }
            }
            if !pending {
                break;
            }
        }
        info!("replay end");
        Ok(())
    }

    /// Aggregate final state into per-process and total statistics.
    /// Read-only; calling it twice gives the same answer.
    pub fn statistics(&self) -> SimulationStats {
        let per_process: Vec<ProcessStats> = self
            .processes
            .iter()
            .map(|ctx| ProcessStats {
                pid: ctx.pid,
                allocated_frames: ctx.page_table.allocated_frames(&self.memory),
                fault_count: ctx.fault_count,
                processed_count: ctx.processed_count,
            })
            .collect();
        let totals = Totals {
            allocated_frames: self.allocator.allocated(),
            fault_count: per_process.iter().map(|p| p.fault_count).sum(),
            processed_count: per_process.iter().map(|p| p.processed_count).sum(),
        };
        SimulationStats {
            per_process,
            totals,
        }
    }

    #[inline]
    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    #[inline]
    pub fn processes(&self) -> &[ProcessContext] {
        &self.processes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Sink recording both the events and the abort signal
    #[derive(Default)]
    struct RecordingSink {
        events: Vec<AccessEvent>,
        out_of_memory: bool,
    }

    impl TraceSink for RecordingSink {
        fn access(&mut self, event: &AccessEvent) {
            self.events.push(*event);
        }

        fn out_of_memory(&mut self) {
            self.out_of_memory = true;
        }
    }

    fn image(pid: i32, references: &[u8]) -> ProcessImage {
        ProcessImage {
            pid,
            references: references.to_vec(),
        }
    }

    #[test]
    fn test_single_process_flat_repeated_page() {
        let mut sim = Simulator::new(TableKind::Flat);
        sim.admit(image(1, &[5, 5, 5])).unwrap();

        let mut events = Vec::new();
        sim.run(&mut events).unwrap();

        let faults: Vec<bool> = events
            .iter()
            .map(|e| e.translation.fault_count() > 0)
            .collect();
        assert_eq!(faults, vec![true, false, false]);

        let stats = sim.statistics();
        assert_eq!(stats.per_process.len(), 1);
        assert_eq!(stats.per_process[0].fault_count, 1);
        assert_eq!(stats.per_process[0].processed_count, 3);
        assert_eq!(stats.per_process[0].allocated_frames, PAGETABLE_FRAMES + 1);
        assert_eq!(stats.totals.allocated_frames, PAGETABLE_FRAMES + 1);
    }

    #[test]
    fn test_single_process_two_level_faults_per_level() {
        let mut sim = Simulator::new(TableKind::TwoLevel);
        sim.admit(image(1, &[0, 8])).unwrap();

        let mut events = Vec::new();
        sim.run(&mut events).unwrap();

        let stats = sim.statistics();
        // Each reference faults at both levels: 4 faults over 2 references
        assert_eq!(stats.per_process[0].fault_count, 4);
        assert_eq!(stats.per_process[0].processed_count, 2);
        // Root + 2 level-2 tables + 2 data pages
        assert_eq!(stats.per_process[0].allocated_frames, 5);
        assert_eq!(stats.totals.allocated_frames, 5);
    }

    #[test]
    fn test_out_of_memory_halts_and_keeps_partial_results() {
        // Flat table block fills 8 of 10 frames; the third data fault
        // cannot be served
        let mut sim = Simulator::with_frames(TableKind::Flat, PAGETABLE_FRAMES + 2);
        sim.admit(image(3, &[0, 1, 2])).unwrap();

        let mut sink = RecordingSink::default();
        assert_eq!(sim.run(&mut sink), Err(TranslateError::OutOfMemory));
        assert!(sink.out_of_memory);
        assert_eq!(sink.events.len(), 2);

        let stats = sim.statistics();
        assert_eq!(stats.per_process[0].processed_count, 2);
        assert_eq!(stats.per_process[0].fault_count, 2);
        assert_eq!(stats.totals.allocated_frames, PAGETABLE_FRAMES + 2);
    }

    #[test]
    fn test_round_robin_drops_drained_processes() {
        let mut sim = Simulator::new(TableKind::Flat);
        sim.admit(image(1, &[3])).unwrap();
        sim.admit(image(2, &[1, 2, 3])).unwrap();

        let mut events = Vec::new();
        sim.run(&mut events).unwrap();

        let order: Vec<(i32, usize)> = events.iter().map(|e| (e.pid, e.index)).collect();
        assert_eq!(order, vec![(1, 0), (2, 0), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_round_robin_interleaves_in_admission_order() {
        let mut sim = Simulator::new(TableKind::TwoLevel);
        sim.admit(image(7, &[0, 1])).unwrap();
        sim.admit(image(8, &[2, 3])).unwrap();

        let mut events = Vec::new();
        sim.run(&mut events).unwrap();

        let order: Vec<i32> = events.iter().map(|e| e.pid).collect();
        assert_eq!(order, vec![7, 8, 7, 8]);
    }

    #[test]
    fn test_invalid_reference_aborts_without_oom_signal() {
        let mut sim = Simulator::new(TableKind::Flat);
        sim.admit(image(1, &[200])).unwrap();

        let mut sink = RecordingSink::default();
        assert_eq!(
            sim.run(&mut sink),
            Err(TranslateError::InvalidReference(200))
        );
        assert!(!sink.out_of_memory);
        assert!(sink.events.is_empty());
        assert_eq!(sim.statistics().per_process[0].processed_count, 0);
    }

    #[test]
    fn test_admission_fails_when_table_block_does_not_fit() {
        let mut sim = Simulator::with_frames(TableKind::Flat, PAGETABLE_FRAMES - 1);
        assert_eq!(sim.admit(image(1, &[0])), Err(OutOfMemory));
        assert!(sim.processes().is_empty());
    }

    #[test]
    fn test_duplicate_pids_are_kept_apart() {
        let mut sim = Simulator::new(TableKind::Flat);
        sim.admit(image(4, &[0])).unwrap();
        sim.admit(image(4, &[0, 0])).unwrap();

        let mut events = Vec::new();
        sim.run(&mut events).unwrap();

        let stats = sim.statistics();
        assert_eq!(stats.per_process.len(), 2);
        assert_eq!(stats.per_process[0].processed_count, 1);
        assert_eq!(stats.per_process[1].processed_count, 2);
        // Same page number in different processes maps to different frames
        assert_eq!(stats.totals.allocated_frames, 2 * PAGETABLE_FRAMES + 2);
    }

    #[test]
    fn test_empty_reference_sequence_only_costs_the_table() {
        let mut sim = Simulator::new(TableKind::TwoLevel);
        sim.admit(image(9, &[])).unwrap();

        let mut events = Vec::new();
        sim.run(&mut events).unwrap();
        assert!(events.is_empty());

        let stats = sim.statistics();
        assert_eq!(stats.per_process[0].allocated_frames, 1);
        assert_eq!(stats.totals.allocated_frames, 1);
    }

    #[test]
    fn test_per_process_frames_sum_to_the_global_count() {
        for kind in [TableKind::Flat, TableKind::TwoLevel] {
            let mut sim = Simulator::new(kind);
            sim.admit(image(1, &[0, 5, 5, 63])).unwrap();
            sim.admit(image(2, &[8, 8, 9, 0])).unwrap();

            let mut events = Vec::new();
            sim.run(&mut events).unwrap();

            let stats = sim.statistics();
            let per_process_sum: usize =
                stats.per_process.iter().map(|p| p.allocated_frames).sum();
            assert_eq!(per_process_sum, stats.totals.allocated_frames);
        }
    }

    #[test]
    fn test_fault_frames_are_unique_across_random_replays() {
        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let mut sim = Simulator::new(TableKind::TwoLevel);
            for pid in 0..3 {
                let references: Vec<u8> = (0..40)
                    .map(|_| rng.gen_range(0..VAS_PAGES as u8))
                    .collect();
                sim.admit(image(pid, &references)).unwrap();
            }

            let mut events = Vec::new();
            sim.run(&mut events).unwrap();

            // Every faulted-in data frame appears exactly once
            let mut fault_frames: Vec<usize> = events
                .iter()
                .filter_map(|e| match e.translation {
                    Translation::TwoLevel { page, .. } if page.fault => Some(page.frame),
                    _ => None,
                })
                .collect();
            let before = fault_frames.len();
            fault_frames.sort_unstable();
            fault_frames.dedup();
            assert_eq!(fault_frames.len(), before);

            // And the totals agree with the allocator's own count
            let stats = sim.statistics();
            let per_process_sum: usize =
                stats.per_process.iter().map(|p| p.allocated_frames).sum();
            assert_eq!(per_process_sum, stats.totals.allocated_frames);
            assert_eq!(
                stats.totals.processed_count,
                events.len() as u32
            );
        }
    }

    #[test]
    fn test_statistics_are_idempotent() {
        let mut sim = Simulator::new(TableKind::Flat);
        sim.admit(image(1, &[1, 2, 1])).unwrap();
        let mut events = Vec::new();
        sim.run(&mut events).unwrap();

        let first = sim.statistics();
        let second = sim.statistics();
        assert_eq!(first.per_process, second.per_process);
        assert_eq!(first.totals, second.totals);
    }
}
