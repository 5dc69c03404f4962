use std::fmt;

use bitflags::bitflags;

use crate::constants::*;

bitflags! {
    /// Flag byte of a page-table entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        const V = 1 << 0;
    }
}

/// A page-table entry: mapped frame plus validity and reference metadata.
///
/// While `V` is clear, `frame` and `ref_count` are meaningless and kept at
/// zero. Once set, `V` never reverts (there is no eviction in this model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pte {
    pub frame: usize,
    pub flags: PteFlags,
    pub ref_count: u32,
}

impl Pte {
    pub const fn empty() -> Self {
        Pte {
            frame: 0,
            flags: PteFlags::empty(),
            ref_count: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags.contains(PteFlags::V)
    }

    /// Build a freshly-mapped entry with one recorded reference
    pub fn mapped(frame: usize) -> Self {
        Pte {
            frame,
            flags: PteFlags::V,
            ref_count: 1,
        }
    }
}

impl Default for Pte {
    fn default() -> Self {
        Self::empty()
    }
}

/// One physical frame, viewed at its capacity in page-table entries.
///
/// A 32-byte frame holds 8 four-byte entries, which is exactly one level of
/// the two-level table and one eighth of the flat table.
pub type TableFrame = [Pte; PTES_PER_FRAME];

/// The physical address space: a fixed run of frames.
///
/// Ground truth for every translation. Each frame is a typed record of PTEs
/// rather than raw bytes; data frames never hold data in this simulation, so
/// their entries simply stay untouched.
pub struct PhysicalMemory {
    frames: Box<[TableFrame]>,
}

impl PhysicalMemory {
    /// Create an arena with the reference frame count, all entries invalid
    pub fn new() -> Self {
        Self::with_frames(FRAME_COUNT)
    }

    /// Create an arena with an explicit frame count (small arenas are handy
    /// for exhaustion tests)
    pub fn with_frames(frame_count: usize) -> Self {
        PhysicalMemory {
            frames: vec![[Pte::empty(); PTES_PER_FRAME]; frame_count].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Read the PTE at `entry` within `frame`
    #[inline]
    pub fn pte(&self, frame: usize, entry: usize) -> &Pte {
        &self.frames[frame][entry]
    }

    /// Mutable access to the PTE at `entry` within `frame`
    #[inline]
    pub fn pte_mut(&mut self, frame: usize, entry: usize) -> &mut Pte {
        &mut self.frames[frame][entry]
    }

    /// Reset every entry of `frame`, as when handing it out as a fresh table
    pub fn clear_frame(&mut self, frame: usize) {
        self.frames[frame] = [Pte::empty(); PTES_PER_FRAME];
    }
}

impl Default for PhysicalMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame space exhausted; the request cannot be satisfied, now or ever
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfMemory;

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "physical frame space exhausted")
    }
}

/// Bump allocator over the frame space.
///
/// Frames are handed out as `0, 1, 2, …` and never reclaimed; the only
/// failure mode is running past the end of the arena. One allocator exists
/// per simulation run.
pub struct FrameAllocator {
    next_free_frame: usize,
    frame_count: usize,
}

impl FrameAllocator {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_COUNT)
    }

    pub fn with_capacity(frame_count: usize) -> Self {
        FrameAllocator {
            next_free_frame: 0,
            frame_count,
        }
    }

    /// Hand out the next frame, or fail without changing any state
    pub fn allocate(&mut self) -> Result<usize, OutOfMemory> {
        if self.next_free_frame == self.frame_count {
            return Err(OutOfMemory);
        }
        let frame = self.next_free_frame;
        self.next_free_frame += 1;
        Ok(frame)
    }

    /// Reserve `count` consecutive frames, all or nothing
    pub fn allocate_contiguous(&mut self, count: usize) -> Result<usize, OutOfMemory> {
        if self.next_free_frame + count > self.frame_count {
            return Err(OutOfMemory);
        }
        let base = self.next_free_frame;
        self.next_free_frame += count;
        Ok(base)
    }

    /// Total frames handed out so far
    #[inline]
    pub fn allocated(&self) -> usize {
        self.next_free_frame
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}
