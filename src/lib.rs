pub mod constants;
pub mod io;
pub mod logging;
pub mod memory;
pub mod report;
pub mod simulator;
pub mod translation;

// Re-export commonly used items for convenience
pub use constants::*;
pub use memory::{FrameAllocator, OutOfMemory, PhysicalMemory, Pte, PteFlags};
pub use simulator::{AccessEvent, ProcessImage, Simulator, TraceSink};
pub use translation::{PageTable, TableKind, TranslateError, Translation, VirtualPage};
