// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-process memory statistics (`/proc/<pid>/memstats`)
//! OWNERS: @kernel-mm-team
//! STATUS: Functional (host model)
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests per module, integration tests under tests/
//!
//! Notes:
//! - Two passes over one address space: a census of its regions (VMAs) and a
//!   walk of its four-level page tables.
//! - Both passes run under a single read guard of the address space.
//! - Page categories overlap; the physical total is the sum of the six
//!   counters, so a page can contribute more than once.
//! - Snapshots (TOML) describe a system to inspect from the host.

#![forbid(unsafe_code)]

pub mod error;
pub mod frames;
pub mod mm;
pub mod paging;
pub mod procfs;
pub mod region;
pub mod report;
pub mod snapshot;
pub mod walk;

pub use error::{Error, Result};
pub use frames::{FrameRefs, FrameTable};
pub use mm::{AddressSpace, MemoryDescriptor, Pid, ProcessTable, Task};
pub use paging::{Level, MapError, PageTableHierarchy, Pfn, PteFlags, RawEntry, SwapEntry};
pub use procfs::MemstatsFile;
pub use region::{scan, RegionCounts, RegionError, RegionList, VirtualMemoryRegion, VmFlags};
pub use report::{assemble, collect, MemoryReport};
pub use snapshot::Snapshot;
pub use walk::{classify, walk_page_range, PgStat};
