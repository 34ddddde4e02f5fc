// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Raw hardware words and the tagged entries built from them.

use bitflags::bitflags;

use super::{Level, Pfn};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Flags stored in an x86-64 page-table entry.
    pub struct PteFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        const HUGE = 1 << 7;
        const GLOBAL = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }
}

/// Bits 12..=51 hold the frame number.
const FRAME_MASK: u64 = 0x000f_ffff_ffff_f000;
/// Bits 52..=62 must be clear in a pointer to a lower table.
const TABLE_RESERVED_MASK: u64 = 0x7ff0_0000_0000_0000;

const SWP_TYPE_SHIFT: u32 = 1;
const SWP_TYPE_BITS: u32 = 5;
const SWP_OFFSET_SHIFT: u32 = 9;
const SWP_OFFSET_BITS: u32 = 49;

/// Classification of a raw word at a given level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawKind {
    /// All-zero word.
    Absent,
    /// Non-zero word that cannot be decoded at this level.
    Malformed,
    /// Pointer to the next level down.
    Table,
    /// Huge mapping terminating the descent above the leaf level.
    Huge,
    /// Present 4 KiB mapping at the leaf level.
    Present,
    /// Swapped-out page at the leaf level.
    Swap,
}

/// An undecoded page-table word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawEntry(pub u64);

impl RawEntry {
    /// Returns true when the word is zero.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns true when the present bit is set.
    pub const fn is_present(self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }

    /// Flag view of the word; unknown bits are dropped.
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Frame number referenced by a present word.
    pub const fn frame(self) -> Pfn {
        Pfn((self.0 & FRAME_MASK) >> super::PAGE_SHIFT)
    }

    /// Returns true when a present word at `level` maps a huge page.
    pub const fn is_huge(self, level: Level) -> bool {
        self.is_present() && self.0 & PteFlags::HUGE.bits() != 0 && level.allows_huge()
    }

    /// Returns true when a non-zero word cannot be decoded at `level`.
    pub fn is_bad(self, level: Level) -> bool {
        self.kind(level) == RawKind::Malformed
    }

    /// Classifies the word for a table at `level`.
    pub fn kind(self, level: Level) -> RawKind {
        if self.is_none() {
            return RawKind::Absent;
        }
        if !self.is_present() {
            // Only leaf slots can park a swapped-out page.
            return if level == Level::Leaf { RawKind::Swap } else { RawKind::Malformed };
        }
        if level == Level::Leaf {
            return RawKind::Present;
        }
        if self.0 & PteFlags::HUGE.bits() != 0 {
            return if level.allows_huge() { RawKind::Huge } else { RawKind::Malformed };
        }
        if self.0 & TABLE_RESERVED_MASK != 0 {
            return RawKind::Malformed;
        }
        RawKind::Table
    }

    /// Decodes the swap descriptor held by a non-present word.
    pub const fn to_swap(self) -> SwapEntry {
        SwapEntry {
            swap_type: ((self.0 >> SWP_TYPE_SHIFT) & ((1 << SWP_TYPE_BITS) - 1)) as u8,
            offset: (self.0 >> SWP_OFFSET_SHIFT) & ((1 << SWP_OFFSET_BITS) - 1),
        }
    }
}

/// Location of a swapped-out page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapEntry {
    /// Swap area index. Type 0 does not count as swapped out.
    pub swap_type: u8,
    /// Slot within the swap area.
    pub offset: u64,
}

impl SwapEntry {
    /// Largest encodable swap type.
    pub const MAX_TYPE: u8 = (1 << SWP_TYPE_BITS) - 1;
    /// Largest encodable swap offset.
    pub const MAX_OFFSET: u64 = (1 << SWP_OFFSET_BITS) - 1;

    /// Creates a descriptor, truncating fields to their encodable width.
    pub const fn new(swap_type: u8, offset: u64) -> Self {
        Self { swap_type: swap_type & Self::MAX_TYPE, offset: offset & Self::MAX_OFFSET }
    }

    /// Encodes the descriptor as a non-present leaf word.
    ///
    /// Type 0 at offset 0 encodes to the absent word.
    pub const fn to_raw(self) -> RawEntry {
        RawEntry(
            ((self.swap_type as u64) << SWP_TYPE_SHIFT) | (self.offset << SWP_OFFSET_SHIFT),
        )
    }
}

/// A present mapping of one physical frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageMapping {
    frame: Pfn,
    flags: PteFlags,
}

impl PageMapping {
    /// Creates a mapping; PRESENT is always set.
    pub fn new(frame: Pfn, flags: PteFlags) -> Self {
        Self { frame, flags: flags | PteFlags::PRESENT }
    }

    /// Decodes a present word.
    pub fn from_raw(raw: RawEntry) -> Self {
        Self::new(raw.frame(), raw.flags())
    }

    /// Backing frame.
    pub fn frame(&self) -> Pfn {
        self.frame
    }

    /// Protection and attribute flags.
    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    /// Whether the page may be written.
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PteFlags::WRITABLE)
    }

    /// Whether the mapping covers more than one base page.
    pub fn is_huge(&self) -> bool {
        self.flags.contains(PteFlags::HUGE)
    }

    /// Whether the page is supervisor-only (USER clear).
    pub fn is_special(&self) -> bool {
        !self.flags.contains(PteFlags::USER)
    }

    /// Re-encodes the mapping as a hardware word.
    pub fn to_raw(&self) -> RawEntry {
        RawEntry((self.frame.base() & FRAME_MASK) | self.flags.bits())
    }
}

/// Uninhabited child type of leaf-level entries.
#[derive(Debug)]
pub enum Terminal {}

/// One slot of a table whose children are of type `C`.
#[derive(Debug)]
pub enum Entry<C> {
    /// Nothing mapped.
    Absent,
    /// Non-zero word that must not be followed.
    Malformed(RawEntry),
    /// Next table down.
    Next(Box<C>),
    /// Present mapping; above the leaf level this is a huge page.
    Leaf(PageMapping),
    /// Swapped-out page.
    Swap(SwapEntry),
}

impl<C> Default for Entry<C> {
    fn default() -> Self {
        Entry::Absent
    }
}

impl<C> Entry<C> {
    /// Builds a terminal entry from a raw word at `level`.
    ///
    /// Returns `None` when the word points at a lower table: the tagged
    /// model only follows tables it owns.
    pub fn from_raw(raw: RawEntry, level: Level) -> Option<Self> {
        match raw.kind(level) {
            RawKind::Absent => Some(Entry::Absent),
            RawKind::Malformed => Some(Entry::Malformed(raw)),
            RawKind::Table => None,
            RawKind::Huge => Some(Entry::Leaf(PageMapping::from_raw(raw))),
            // Bit 7 of a leaf word selects a memory type, not a page size.
            RawKind::Present => Some(Entry::Leaf(PageMapping::new(
                raw.frame(),
                raw.flags().difference(PteFlags::HUGE),
            ))),
            RawKind::Swap => Some(Entry::Swap(raw.to_swap())),
        }
    }

    /// Nothing mapped in this slot.
    pub fn is_absent(&self) -> bool {
        matches!(self, Entry::Absent)
    }

    /// Slot holds an undecodable word.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Entry::Malformed(_))
    }

    /// Slot maps a huge page.
    pub fn is_huge(&self) -> bool {
        matches!(self, Entry::Leaf(mapping) if mapping.is_huge())
    }

    /// Slot holds a present word: a lower table or a resident page.
    pub fn is_present(&self) -> bool {
        matches!(self, Entry::Leaf(_) | Entry::Next(_))
    }

    /// Protection flags of a present mapping.
    pub fn flags(&self) -> Option<PteFlags> {
        match self {
            Entry::Leaf(mapping) => Some(mapping.flags()),
            _ => None,
        }
    }

    /// Hardware word for a terminal slot; `None` for a pointer to a lower table.
    pub fn to_raw(&self) -> Option<RawEntry> {
        match self {
            Entry::Absent => Some(RawEntry(0)),
            Entry::Malformed(raw) => Some(*raw),
            Entry::Next(_) => None,
            Entry::Leaf(mapping) => Some(mapping.to_raw()),
            Entry::Swap(swap) => Some(swap.to_raw()),
        }
    }
}
