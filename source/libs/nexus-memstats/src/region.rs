// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Virtual memory regions (VMAs) and the region scanner.

use std::sync::Arc;

use bitflags::bitflags;

use crate::paging::PAGE_SIZE;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Region attribute flags, numbered as in the Linux `vm_flags` word.
    pub struct VmFlags: u32 {
        const READ = 0x0000_0001;
        const WRITE = 0x0000_0002;
        const EXEC = 0x0000_0004;
        const SHARED = 0x0000_0008;
        const MAYSHARE = 0x0000_0080;
        const EXECUTABLE = 0x0000_1000;
        const LOCKED = 0x0000_2000;
    }
}

impl VmFlags {
    /// Parses the four-character permission column of `/proc/<pid>/maps`,
    /// e.g. `r-xp` or `rw-s`.
    pub fn from_perms(perms: &str) -> Result<Self, RegionError> {
        let bytes = perms.as_bytes();
        if bytes.len() != 4 {
            return Err(RegionError::BadPerms);
        }
        let mut flags = VmFlags::empty();
        for (byte, (set, flag)) in bytes[..3]
            .iter()
            .zip([(b'r', VmFlags::READ), (b'w', VmFlags::WRITE), (b'x', VmFlags::EXEC)])
        {
            match *byte {
                b'-' => {}
                b if b == set => flags |= flag,
                _ => return Err(RegionError::BadPerms),
            }
        }
        match bytes[3] {
            b's' => flags |= VmFlags::SHARED | VmFlags::MAYSHARE,
            b'p' => {}
            _ => return Err(RegionError::BadPerms),
        }
        Ok(flags)
    }
}

/// Errors raised while building region lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// End does not lie above start.
    #[error("region end must lie above its start")]
    Empty,
    /// Bounds are not page aligned.
    #[error("region bounds must be page aligned")]
    Unaligned,
    /// Region intersects an existing sibling.
    #[error("region overlaps an existing region")]
    Overlap,
    /// Permission string is not of the `rwxp` form.
    #[error("malformed permission string")]
    BadPerms,
}

/// File backing a region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackingFile {
    /// Path the file was opened under.
    pub path: String,
    /// Byte offset of the region's first page within the file.
    pub offset: u64,
}

/// One contiguous, homogeneously flagged span of virtual address space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualMemoryRegion {
    start: u64,
    end: u64,
    flags: VmFlags,
    file: Option<Arc<BackingFile>>,
}

impl VirtualMemoryRegion {
    /// Creates a region covering `[start, end)`.
    pub fn new(
        start: u64,
        end: u64,
        flags: VmFlags,
        file: Option<Arc<BackingFile>>,
    ) -> Result<Self, RegionError> {
        if end <= start {
            return Err(RegionError::Empty);
        }
        if start % PAGE_SIZE != 0 || end % PAGE_SIZE != 0 {
            return Err(RegionError::Unaligned);
        }
        Ok(Self { start, end, flags, file })
    }

    /// Anonymous region shorthand.
    pub fn anonymous(start: u64, end: u64, flags: VmFlags) -> Result<Self, RegionError> {
        Self::new(start, end, flags, None)
    }

    /// First address of the region.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last address of the region.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Length in bytes.
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Attribute flags.
    pub fn flags(&self) -> VmFlags {
        self.flags
    }

    /// Backing file, `None` for anonymous memory.
    pub fn file(&self) -> Option<&BackingFile> {
        self.file.as_deref()
    }

    /// Whether `addr` falls inside the region.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// Regions of one address space, strictly increasing and non-overlapping.
#[derive(Clone, Debug, Default)]
pub struct RegionList {
    regions: Vec<VirtualMemoryRegion>,
}

impl RegionList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `region` at its ordered position.
    pub fn insert(&mut self, region: VirtualMemoryRegion) -> Result<(), RegionError> {
        let at = self.regions.partition_point(|r| r.start < region.start);
        let clashes_prev = at > 0 && self.regions[at - 1].end > region.start;
        let clashes_next = self.regions.get(at).is_some_and(|next| next.start < region.end);
        if clashes_prev || clashes_next {
            return Err(RegionError::Overlap);
        }
        self.regions.insert(at, region);
        Ok(())
    }

    /// Region containing `addr`, if any.
    pub fn find(&self, addr: u64) -> Option<&VirtualMemoryRegion> {
        let at = self.regions.partition_point(|r| r.end <= addr);
        self.regions.get(at).filter(|r| r.contains(addr))
    }

    /// Iterates regions by increasing start address.
    pub fn iter(&self) -> std::slice::Iter<'_, VirtualMemoryRegion> {
        self.regions.iter()
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns true when the list is empty.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegionList {
    type Item = &'a VirtualMemoryRegion;
    type IntoIter = std::slice::Iter<'a, VirtualMemoryRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Region-level counters produced by [`scan`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionCounts {
    /// Number of regions.
    pub total: u64,
    /// Size in bytes of the largest region.
    pub biggest_size: u64,
    /// Regions with READ.
    pub readable: u64,
    /// Regions with WRITE.
    pub writable: u64,
    /// Regions with EXEC.
    pub executable: u64,
    /// Regions with MAYSHARE.
    pub shared: u64,
    /// Regions without MAYSHARE.
    pub private: u64,
    /// Regions with LOCKED.
    pub locked: u64,
    /// Regions with EXECUTABLE (program image).
    pub exec_image: u64,
    /// Regions backed by a file.
    pub file_backed: u64,
    /// Regions without a backing file.
    pub anonymous: u64,
}

/// Counts regions by attribute in a single ordered pass.
pub fn scan<'a, I>(regions: I) -> RegionCounts
where
    I: IntoIterator<Item = &'a VirtualMemoryRegion>,
{
    let mut counts = RegionCounts::default();
    for region in regions {
        let flags = region.flags();
        counts.total += 1;
        counts.biggest_size = counts.biggest_size.max(region.size());
        counts.readable += u64::from(flags.contains(VmFlags::READ));
        counts.writable += u64::from(flags.contains(VmFlags::WRITE));
        counts.executable += u64::from(flags.contains(VmFlags::EXEC));
        if flags.contains(VmFlags::MAYSHARE) {
            counts.shared += 1;
        } else {
            counts.private += 1;
        }
        counts.locked += u64::from(flags.contains(VmFlags::LOCKED));
        counts.exec_image += u64::from(flags.contains(VmFlags::EXECUTABLE));
        if region.file().is_some() {
            counts.file_backed += 1;
        } else {
            counts.anonymous += 1;
        }
    }
    counts
}
