pub const FRAME_SIZE: usize = 32;
pub const FRAME_COUNT: usize = 256;
pub const PAS_SIZE: usize = FRAME_SIZE * FRAME_COUNT;

pub const VAS_PAGES: usize = 64;

pub const PTE_SIZE: usize = 4;
pub const PTES_PER_FRAME: usize = FRAME_SIZE / PTE_SIZE;
pub const PAGETABLE_FRAMES: usize = VAS_PAGES * PTE_SIZE / FRAME_SIZE;

pub const L1_ENTRIES: usize = 8;
pub const L2_ENTRIES: usize = VAS_PAGES / L1_ENTRIES;

pub const MAX_PROCESSES: usize = 10;
pub const MAX_REFERENCES: usize = 256;
