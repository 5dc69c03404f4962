use std::fmt;

use crate::constants::*;
use crate::memory::{FrameAllocator, OutOfMemory, PhysicalMemory, Pte, PteFlags};

/// A virtual page number decomposed into its two-level table indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualPage {
    pub vpn: usize,
    pub l1: usize,
    pub l2: usize,
}

impl VirtualPage {
    /// Split a raw VPN into its level-1 and level-2 indices
    pub fn split(vpn: usize) -> Self {
        VirtualPage {
            vpn,
            l1: vpn / L2_ENTRIES,
            l2: vpn % L2_ENTRIES,
        }
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VPN({}) = (l1={}, l2={})", self.vpn, self.l1, self.l2)
    }
}

/// Why a translation attempt ended the replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateError {
    /// No frame left to satisfy the fault
    OutOfMemory,
    /// The reference names a page outside the virtual address space
    InvalidReference(usize),
}

impl From<OutOfMemory> for TranslateError {
    fn from(_: OutOfMemory) -> Self {
        TranslateError::OutOfMemory
    }
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::OutOfMemory => write!(f, "out of memory"),
            TranslateError::InvalidReference(vpn) => {
                write!(f, "invalid page reference {} (max {})", vpn, VAS_PAGES - 1)
            }
        }
    }
}

/// Outcome of one table lookup: the resulting frame and whether it faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub frame: usize,
    pub fault: bool,
}

/// Outcome of one full translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    Flat(Access),
    TwoLevel {
        /// Level-1 lookup, resolving the level-2 table frame
        table: Access,
        /// Level-2 lookup, resolving the data frame
        page: Access,
    },
}

impl Translation {
    /// The frame the virtual page finally maps to
    pub fn data_frame(&self) -> usize {
        match self {
            Translation::Flat(access) => access.frame,
            Translation::TwoLevel { page, .. } => page.frame,
        }
    }

    /// Number of faults this translation incurred (0..=2)
    pub fn fault_count(&self) -> u32 {
        match self {
            Translation::Flat(access) => access.fault as u32,
            Translation::TwoLevel { table, page } => table.fault as u32 + page.fault as u32,
        }
    }
}

/// Single-level table: one PTE per virtual page, stored in a block of
/// consecutive frames reserved up front.
pub struct FlatPageTable {
    base_frame: usize,
}

impl FlatPageTable {
    /// Reserve and clear the table's frame block
    pub fn new(
        pm: &mut PhysicalMemory,
        allocator: &mut FrameAllocator,
    ) -> Result<Self, OutOfMemory> {
        let base_frame = allocator.allocate_contiguous(PAGETABLE_FRAMES)?;
        for frame in base_frame..base_frame + PAGETABLE_FRAMES {
            pm.clear_frame(frame);
        }
        Ok(FlatPageTable { base_frame })
    }

    /// Locate the (frame, entry) slot holding the PTE for `vpn`
    #[inline]
    fn slot(&self, vpn: usize) -> (usize, usize) {
        (self.base_frame + vpn / PTES_PER_FRAME, vpn % PTES_PER_FRAME)
    }

    /// Resolve `vpn`, allocating a data frame on the first touch
    pub fn translate(
        &self,
        vpn: usize,
        pm: &mut PhysicalMemory,
        allocator: &mut FrameAllocator,
    ) -> Result<Access, TranslateError> {
        if vpn >= VAS_PAGES {
            return Err(TranslateError::InvalidReference(vpn));
        }
        let (frame, entry) = self.slot(vpn);
        if pm.pte(frame, entry).is_valid() {
            let pte = pm.pte_mut(frame, entry);
            pte.ref_count += 1;
            Ok(Access {
                frame: pte.frame,
                fault: false,
            })
        } else {
            let data_frame = allocator.allocate()?;
            *pm.pte_mut(frame, entry) = Pte::mapped(data_frame);
            Ok(Access {
                frame: data_frame,
                fault: true,
            })
        }
    }

    /// Valid mappings as `(vpn, pte)`, in page order
    pub fn entries(&self, pm: &PhysicalMemory) -> Vec<(usize, Pte)> {
        (0..VAS_PAGES)
            .filter_map(|vpn| {
                let (frame, entry) = self.slot(vpn);
                let pte = *pm.pte(frame, entry);
                pte.is_valid().then_some((vpn, pte))
            })
            .collect()
    }
}

/// Two-level table: a one-frame root whose entries point at lazily
/// allocated one-frame level-2 tables.
pub struct TwoLevelPageTable {
    root_frame: usize,
}

impl TwoLevelPageTable {
    /// Allocate and clear the level-1 frame
    pub fn new(
        pm: &mut PhysicalMemory,
        allocator: &mut FrameAllocator,
    ) -> Result<Self, OutOfMemory> {
        let root_frame = allocator.allocate()?;
        pm.clear_frame(root_frame);
        Ok(TwoLevelPageTable { root_frame })
    }

    /// Walk both levels for `vpn`, allocating the level-2 table and the data
    /// frame as needed.
    ///
    /// A level-1 link created just before a failing level-2 allocation is
    /// left in place; nothing is rolled back on the abort path.
    pub fn translate(
        &self,
        vpn: usize,
        pm: &mut PhysicalMemory,
        allocator: &mut FrameAllocator,
    ) -> Result<Translation, TranslateError> {
        if vpn >= VAS_PAGES {
            return Err(TranslateError::InvalidReference(vpn));
        }
        let page = VirtualPage::split(vpn);

        // Level 1: find or create the level-2 table. The level-1 entry
        // models an intermediate table, so it carries no reference count.
        let table = if pm.pte(self.root_frame, page.l1).is_valid() {
            Access {
                frame: pm.pte(self.root_frame, page.l1).frame,
                fault: false,
            }
        } else {
            let table_frame = allocator.allocate()?;
            pm.clear_frame(table_frame);
            *pm.pte_mut(self.root_frame, page.l1) = Pte {
                frame: table_frame,
                flags: PteFlags::V,
                ref_count: 0,
            };
            Access {
                frame: table_frame,
                fault: true,
            }
        };

        // Level 2: find or create the data page
        let data = if pm.pte(table.frame, page.l2).is_valid() {
            let pte = pm.pte_mut(table.frame, page.l2);
            pte.ref_count += 1;
            Access {
                frame: pte.frame,
                fault: false,
            }
        } else {
            let data_frame = allocator.allocate()?;
            *pm.pte_mut(table.frame, page.l2) = Pte::mapped(data_frame);
            Access {
                frame: data_frame,
                fault: true,
            }
        };

        Ok(Translation::TwoLevel { table, page: data })
    }

    /// Valid level-1 entries as `(l1 index, level-2 table frame)`
    pub fn level1(&self, pm: &PhysicalMemory) -> Vec<(usize, usize)> {
        (0..L1_ENTRIES)
            .filter_map(|l1| {
                let pte = pm.pte(self.root_frame, l1);
                pte.is_valid().then_some((l1, pte.frame))
            })
            .collect()
    }

    /// Valid entries of the level-2 table in `table_frame`, as `(l2 index, pte)`
    pub fn level2(&self, pm: &PhysicalMemory, table_frame: usize) -> Vec<(usize, Pte)> {
        (0..L2_ENTRIES)
            .filter_map(|l2| {
                let pte = *pm.pte(table_frame, l2);
                pte.is_valid().then_some((l2, pte))
            })
            .collect()
    }
}

/// Which page-table shape a simulation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Flat,
    TwoLevel,
}

/// A process's page table, in either shape
pub enum PageTable {
    Flat(FlatPageTable),
    TwoLevel(TwoLevelPageTable),
}

impl PageTable {
    /// Build an empty table of the requested shape, reserving its
    /// structural frames
    pub fn new(
        kind: TableKind,
        pm: &mut PhysicalMemory,
        allocator: &mut FrameAllocator,
    ) -> Result<Self, OutOfMemory> {
        match kind {
            TableKind::Flat => Ok(PageTable::Flat(FlatPageTable::new(pm, allocator)?)),
            TableKind::TwoLevel => Ok(PageTable::TwoLevel(TwoLevelPageTable::new(pm, allocator)?)),
        }
    }

    /// Resolve one virtual page, faulting in frames as needed
    pub fn translate(
        &self,
        vpn: usize,
        pm: &mut PhysicalMemory,
        allocator: &mut FrameAllocator,
    ) -> Result<Translation, TranslateError> {
        match self {
            PageTable::Flat(table) => table.translate(vpn, pm, allocator).map(Translation::Flat),
            PageTable::TwoLevel(table) => table.translate(vpn, pm, allocator),
        }
    }

    /// Frames occupied by the table structure itself
    pub fn structural_frames(&self, pm: &PhysicalMemory) -> usize {
        match self {
            PageTable::Flat(_) => PAGETABLE_FRAMES,
            PageTable::TwoLevel(table) => 1 + table.level1(pm).len(),
        }
    }

    /// Count of valid data-page mappings
    pub fn data_pages(&self, pm: &PhysicalMemory) -> usize {
        match self {
            PageTable::Flat(table) => table.entries(pm).len(),
            PageTable::TwoLevel(table) => table
                .level1(pm)
                .iter()
                .map(|&(_, table_frame)| table.level2(pm, table_frame).len())
                .sum(),
        }
    }

    /// Total frames attributable to this table: structure plus data pages
    pub fn allocated_frames(&self, pm: &PhysicalMemory) -> usize {
        self.structural_frames(pm) + self.data_pages(pm)
    }
}
