// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Four-level page-table model (x86-64 layout, 4 KiB base pages).
//!
//! Each level is a fixed array of [`ENTRIES_PER_TABLE`] tagged entries. The
//! subtree below an absent or malformed slot is unreachable by construction:
//! only [`Entry::Next`] owns a child table.

mod entry;
mod table;

pub use entry::{Entry, PageMapping, PteFlags, RawEntry, RawKind, SwapEntry, Terminal};
pub use table::{PageTableHierarchy, PgdTable, PmdTable, PteTable, PudTable, Table};

use core::fmt;

use static_assertions::const_assert_eq;

/// log2 of the base page size.
pub const PAGE_SHIFT: u32 = 12;
/// Size of a base page in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;
/// Number of entries in a table at any level.
pub const ENTRIES_PER_TABLE: usize = 512;
/// Number of virtual-address bits consumed by one level index.
const INDEX_BITS: u32 = 9;

/// Bytes covered by one leaf (PTE) entry.
pub const PTE_SPAN: u64 = PAGE_SIZE;
/// Bytes covered by one middle (PMD) entry.
pub const PMD_SPAN: u64 = PTE_SPAN * ENTRIES_PER_TABLE as u64;
/// Bytes covered by one upper (PUD) entry.
pub const PUD_SPAN: u64 = PMD_SPAN * ENTRIES_PER_TABLE as u64;
/// Bytes covered by one root (PGD) entry.
pub const PGD_SPAN: u64 = PUD_SPAN * ENTRIES_PER_TABLE as u64;
/// Size of the range addressable through one root table.
pub const ADDRESS_SPACE_SIZE: u64 = PGD_SPAN * ENTRIES_PER_TABLE as u64;

const_assert_eq!(ENTRIES_PER_TABLE, 1 << INDEX_BITS);
const_assert_eq!(PMD_SPAN, 2 * 1024 * 1024);
const_assert_eq!(PUD_SPAN, 1024 * 1024 * 1024);
const_assert_eq!(ADDRESS_SPACE_SIZE, 1 << 48);

/// Physical page frame number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pfn(pub u64);

impl Pfn {
    /// Physical address of the first byte of the frame.
    pub const fn base(self) -> u64 {
        self.0 << PAGE_SHIFT
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Level of the hierarchy, root first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Page global directory.
    Root,
    /// Page upper directory; entries may map 1 GiB pages.
    Upper,
    /// Page middle directory; entries may map 2 MiB pages.
    Middle,
    /// Page table proper; entries map 4 KiB pages or swap slots.
    Leaf,
}

impl Level {
    /// All levels in descent order.
    pub const ALL: [Level; 4] = [Level::Root, Level::Upper, Level::Middle, Level::Leaf];

    /// Bytes of virtual address space covered by one entry at this level.
    pub const fn span(self) -> u64 {
        match self {
            Level::Root => PGD_SPAN,
            Level::Upper => PUD_SPAN,
            Level::Middle => PMD_SPAN,
            Level::Leaf => PTE_SPAN,
        }
    }

    /// Bit position of this level's index within a virtual address.
    pub const fn shift(self) -> u32 {
        match self {
            Level::Root => PAGE_SHIFT + 3 * INDEX_BITS,
            Level::Upper => PAGE_SHIFT + 2 * INDEX_BITS,
            Level::Middle => PAGE_SHIFT + INDEX_BITS,
            Level::Leaf => PAGE_SHIFT,
        }
    }

    /// Index of the entry covering `va` in a table at this level.
    pub const fn index_of(self, va: u64) -> usize {
        ((va >> self.shift()) as usize) & (ENTRIES_PER_TABLE - 1)
    }

    /// Level below this one, `None` for the leaf level.
    pub const fn next(self) -> Option<Level> {
        match self {
            Level::Root => Some(Level::Upper),
            Level::Upper => Some(Level::Middle),
            Level::Middle => Some(Level::Leaf),
            Level::Leaf => None,
        }
    }

    /// Whether an entry at this level may terminate the descent with a huge mapping.
    pub const fn allows_huge(self) -> bool {
        matches!(self, Level::Upper | Level::Middle)
    }

    /// Short lowercase name, as used in snapshot files and log lines.
    pub const fn name(self) -> &'static str {
        match self {
            Level::Root => "root",
            Level::Upper => "upper",
            Level::Middle => "middle",
            Level::Leaf => "leaf",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when populating a page-table hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// Virtual address is not aligned to the span of the target level.
    #[error("address not aligned for the target level")]
    Unaligned,
    /// Virtual address lies outside the range one root table can describe.
    #[error("address outside the 48-bit range")]
    OutOfRange,
    /// Target slot is occupied, or a huge mapping blocks the descent.
    #[error("slot already in use")]
    Overlap,
    /// Flags or level do not describe an entry that can be installed there.
    #[error("invalid flags for this level")]
    InvalidFlags,
}
