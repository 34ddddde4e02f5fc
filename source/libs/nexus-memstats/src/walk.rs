// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-table walk: per-level walkers and the leaf classifier.
//!
//! The walk is bounded by the hierarchy depth and the fixed table size, never
//! follows an absent or malformed slot, and communicates only through the
//! caller's [`PgStat`]. Callers hold the address-space read guard for the
//! whole walk.

use log::trace;

use crate::frames::FrameRefs;
use crate::paging::{
    Entry, Level, PageMapping, PageTableHierarchy, PgdTable, PmdTable, PteTable, PudTable,
};

/// Page-level counters accumulated by one walk.
///
/// Categories overlap: a writable huge page shared by two mappings bumps
/// three counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PgStat {
    /// Present mappings with write permission.
    pub writable_pages: u64,
    /// Present mappings without write permission.
    pub read_only_pages: u64,
    /// Present mappings whose frame is referenced more than once.
    pub shared_pages: u64,
    /// Present supervisor-only mappings.
    pub special_pages: u64,
    /// Present mappings larger than a base page.
    pub huge_pages: u64,
    /// Swap entries with a non-zero swap type.
    pub pages_swapped: u64,
}

impl PgStat {
    /// Sum of all six counters, counting a page once per category it matches.
    pub fn total(&self) -> u64 {
        self.writable_pages
            + self.read_only_pages
            + self.shared_pages
            + self.special_pages
            + self.huge_pages
            + self.pages_swapped
    }
}

/// Walks every table reachable from the root of `pt`.
pub fn walk_page_range<F: FrameRefs + ?Sized>(
    pt: &PageTableHierarchy,
    frames: &F,
    stat: &mut PgStat,
) {
    walk_pgd(pt.root(), 0, frames, stat);
}

/// Walks a root table whose first entry maps `addr`.
pub fn walk_pgd<F: FrameRefs + ?Sized>(pgd: &PgdTable, addr: u64, frames: &F, stat: &mut PgStat) {
    let mut addr = addr;
    for entry in pgd {
        match entry {
            Entry::Next(pud) => walk_pud(pud, addr, frames, stat),
            other => skip_or_classify(other, Level::Root, addr, frames, stat),
        }
        addr += Level::Root.span();
    }
}

/// Walks an upper table whose first entry maps `addr`.
pub fn walk_pud<F: FrameRefs + ?Sized>(pud: &PudTable, addr: u64, frames: &F, stat: &mut PgStat) {
    let mut addr = addr;
    for entry in pud {
        match entry {
            Entry::Next(pmd) => walk_pmd(pmd, addr, frames, stat),
            other => skip_or_classify(other, Level::Upper, addr, frames, stat),
        }
        addr += Level::Upper.span();
    }
}

/// Walks a middle table whose first entry maps `addr`.
pub fn walk_pmd<F: FrameRefs + ?Sized>(pmd: &PmdTable, addr: u64, frames: &F, stat: &mut PgStat) {
    let mut addr = addr;
    for entry in pmd {
        match entry {
            Entry::Next(pte) => walk_pte(pte, addr, frames, stat),
            other => skip_or_classify(other, Level::Middle, addr, frames, stat),
        }
        addr += Level::Middle.span();
    }
}

/// Walks a leaf table whose first entry maps `addr`.
pub fn walk_pte<F: FrameRefs + ?Sized>(pte: &PteTable, addr: u64, frames: &F, stat: &mut PgStat) {
    let mut addr = addr;
    for entry in pte {
        if entry.is_malformed() {
            trace!("pte {addr:#x}: skipping malformed word {:?}", entry.to_raw());
        } else if !entry.is_absent() {
            classify(entry, frames, stat);
        }
        addr += Level::Leaf.span();
    }
}

/// Terminal entry above the leaf level: a huge mapping is counted, anything
/// else is a hole.
fn skip_or_classify<C, F: FrameRefs + ?Sized>(
    entry: &Entry<C>,
    level: Level,
    addr: u64,
    frames: &F,
    stat: &mut PgStat,
) {
    match entry {
        Entry::Leaf(mapping) => {
            trace!("{level} {addr:#x}: huge mapping of frame {}", mapping.frame());
            classify_present(mapping, frames, stat);
        }
        Entry::Malformed(raw) => {
            trace!("{level} {addr:#x}: skipping malformed word {:#x}", raw.0);
        }
        Entry::Swap(swap) => {
            trace!("{level} {addr:#x}: swap entry {swap:?} above leaf level, skipped");
        }
        Entry::Absent | Entry::Next(_) => {}
    }
}

/// Updates `stat` for one terminal entry.
///
/// Absent slots are ignored. A present mapping counts as exactly one of
/// writable or read-only, plus special, shared, and huge where they apply.
/// A swap entry counts only when its swap type is non-zero.
pub fn classify<C, F: FrameRefs + ?Sized>(entry: &Entry<C>, frames: &F, stat: &mut PgStat) {
    match entry {
        Entry::Leaf(mapping) => classify_present(mapping, frames, stat),
        Entry::Swap(swap) => {
            if swap.swap_type != 0 {
                stat.pages_swapped += 1;
            }
        }
        Entry::Absent | Entry::Malformed(_) | Entry::Next(_) => {}
    }
}

fn classify_present<F: FrameRefs + ?Sized>(mapping: &PageMapping, frames: &F, stat: &mut PgStat) {
    if mapping.is_writable() {
        stat.writable_pages += 1;
    } else {
        stat.read_only_pages += 1;
    }
    if mapping.is_special() {
        stat.special_pages += 1;
    }
    if frames.ref_count(mapping.frame()).is_some_and(|count| count > 1) {
        stat.shared_pages += 1;
    }
    if mapping.is_huge() {
        stat.huge_pages += 1;
    }
}
