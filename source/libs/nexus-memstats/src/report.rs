// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Report assembly: combines the region census and the page walk of one
//! address space into the two-section memory report.

use core::fmt;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::frames::FrameRefs;
use crate::mm::Task;
use crate::region::{scan, RegionCounts};
use crate::walk::{walk_page_range, PgStat};

/// Full memory statistics of one process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryReport {
    /// Region-level counters.
    pub vma: RegionCounts,
    /// Page-level counters.
    pub pages: PgStat,
}

impl MemoryReport {
    /// Sum of the six page counters; a page matching several categories is
    /// counted once per category.
    pub fn total_physical_pages(&self) -> u64 {
        self.pages.total()
    }
}

/// Combines the two scans. Pure.
pub fn assemble(vma: RegionCounts, pages: PgStat) -> MemoryReport {
    MemoryReport { vma, pages }
}

/// Scans the regions and walks the page tables of `task` under a single
/// read guard of its address space.
pub fn collect<F: FrameRefs + ?Sized>(task: &Task, frames: &F) -> Result<MemoryReport> {
    let Some(mm) = task.mm() else {
        warn!("memstats: pid {} ({}) has no address space", task.pid(), task.comm());
        return Err(Error::NoAddressSpace { pid: task.pid() });
    };

    let (vma, pages) = {
        let space = mm.read();
        let vma = scan(space.regions());
        let mut pages = PgStat::default();
        walk_page_range(space.page_table(), frames, &mut pages);
        (vma, pages)
    };

    debug!(
        "memstats: pid {} regions={} pages={}",
        task.pid(),
        vma.total,
        pages.total()
    );
    Ok(assemble(vma, pages))
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.vma;
        writeln!(f, "Virtual Memory Area Stats:")?;
        writeln!(f, "\tTotal VMAs: {}", v.total)?;
        writeln!(f, "\tBiggest VMA Size: {}", v.biggest_size)?;
        writeln!(f, "\tReadable VMAs: {}", v.readable)?;
        writeln!(f, "\tWritable VMAs: {}", v.writable)?;
        writeln!(f, "\tExecutable VMAs: {}", v.executable)?;
        writeln!(f, "\tShared VMAs: {}", v.shared)?;
        writeln!(f, "\tPrivate VMAs: {}", v.private)?;
        writeln!(f, "\tLocked VMAs: {}", v.locked)?;
        writeln!(f, "\tExecutable Image VMAs: {}", v.exec_image)?;
        writeln!(f, "\tFile Backed VMAs: {}", v.file_backed)?;
        writeln!(f, "\tAnonymous VMAs: {}", v.anonymous)?;

        let p = &self.pages;
        writeln!(f, "Physical Pages Stats:")?;
        writeln!(f, "\tTotal Physical Pages: {}", self.total_physical_pages())?;
        writeln!(f, "\tNumber of Pages Swapped Out: {}", p.pages_swapped)?;
        writeln!(f, "\tRead-Only Pages: {}", p.read_only_pages)?;
        writeln!(f, "\tWritable Pages: {}", p.writable_pages)?;
        writeln!(f, "\tNumber of Shared Pages: {}", p.shared_pages)?;
        writeln!(f, "\tNumber of Special Pages: {}", p.special_pages)?;
        writeln!(f, "\tNumber of Huge Pages: {}", p.huge_pages)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::frames::FrameTable;
    use crate::mm::{AddressSpace, MemoryDescriptor, Pid};
    use crate::paging::{Pfn, PteFlags};
    use crate::region::{VirtualMemoryRegion, VmFlags};

    #[test]
    fn assemble_sums_page_counters() {
        let pages = PgStat {
            writable_pages: 3,
            read_only_pages: 2,
            shared_pages: 1,
            special_pages: 0,
            huge_pages: 1,
            pages_swapped: 0,
        };
        let report = assemble(RegionCounts::default(), pages);
        assert_eq!(report.total_physical_pages(), 7);
    }

    #[test]
    fn empty_space_renders_zeroes() {
        let task = Task::new(Pid(7), "idle", Arc::new(MemoryDescriptor::default()));
        let report = collect(&task, &FrameTable::new()).expect("report");
        assert_eq!(report, MemoryReport::default());
        let text = report.to_string();
        assert!(text.starts_with("Virtual Memory Area Stats:\n\tTotal VMAs: 0\n"));
        assert!(text.ends_with("\tNumber of Huge Pages: 0\n"));
        assert_eq!(text.lines().count(), 20);
    }

    #[test]
    fn kernel_thread_is_rejected_before_locking() {
        let task = Task::kernel_thread(Pid(2), "kswapd0");
        let err = collect(&task, &FrameTable::new()).unwrap_err();
        assert!(matches!(err, Error::NoAddressSpace { pid: Pid(2) }));
    }

    #[test]
    fn guard_is_released_after_collection() {
        let mut space = AddressSpace::new();
        space
            .regions_mut()
            .insert(VirtualMemoryRegion::anonymous(0x1000, 0x2000, VmFlags::READ).expect("vma"))
            .expect("insert");
        space.page_table_mut().map(0x1000, Pfn(1), PteFlags::USER).expect("map");
        let mm = Arc::new(MemoryDescriptor::new(space));
        let task = Task::new(Pid(5), "app", Arc::clone(&mm));

        let report = collect(&task, &FrameTable::new()).expect("report");
        assert_eq!(report.vma.total, 1);
        assert_eq!(report.pages.read_only_pages, 1);
        // A writer can proceed once the report is built.
        mm.write().page_table_mut().unmap(0x1000).expect("unmap");
    }
}
