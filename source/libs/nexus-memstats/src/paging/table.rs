// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Four-level page-table hierarchy with lazy allocation of intermediate levels.

use core::slice;

use super::{
    Entry, Level, MapError, PageMapping, Pfn, PteFlags, RawEntry, SwapEntry, Terminal,
    ADDRESS_SPACE_SIZE, ENTRIES_PER_TABLE,
};

/// Fixed-size array of entries whose children are of type `C`.
#[derive(Debug)]
pub struct Table<C> {
    entries: Box<[Entry<C>; ENTRIES_PER_TABLE]>,
}

/// Leaf table: entries map 4 KiB pages or swap slots.
pub type PteTable = Table<Terminal>;
/// Middle table: entries point at leaf tables or map 2 MiB pages.
pub type PmdTable = Table<PteTable>;
/// Upper table: entries point at middle tables or map 1 GiB pages.
pub type PudTable = Table<PmdTable>;
/// Root table of one address space.
pub type PgdTable = Table<PudTable>;

impl<C> Table<C> {
    /// Creates a table with every slot absent.
    pub fn new() -> Self {
        Self { entries: Box::new(core::array::from_fn(|_| Entry::Absent)) }
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: usize) -> Option<&Entry<C>> {
        self.entries.get(index)
    }

    /// Replaces the entry at `index`, returning the previous occupant.
    pub fn set(&mut self, index: usize, entry: Entry<C>) -> Result<Entry<C>, MapError> {
        let slot = self.entries.get_mut(index).ok_or(MapError::OutOfRange)?;
        Ok(core::mem::replace(slot, entry))
    }

    /// Iterates entries in index order.
    pub fn iter(&self) -> slice::Iter<'_, Entry<C>> {
        self.entries.iter()
    }

    /// Number of slots that are not absent.
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_absent()).count()
    }

    fn slot_mut(&mut self, level: Level, va: u64) -> &mut Entry<C> {
        &mut self.entries[level.index_of(va)]
    }

    fn slot(&self, level: Level, va: u64) -> &Entry<C> {
        &self.entries[level.index_of(va)]
    }
}

impl<C> Default for Table<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, C> IntoIterator for &'a Table<C> {
    type Item = &'a Entry<C>;
    type IntoIter = slice::Iter<'a, Entry<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Page tables of one address space, rooted at a single [`PgdTable`].
#[derive(Debug, Default)]
pub struct PageTableHierarchy {
    root: PgdTable,
}

impl PageTableHierarchy {
    /// Creates an empty hierarchy with a fresh root table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows the root table for read-only traversal.
    pub fn root(&self) -> &PgdTable {
        &self.root
    }

    /// Installs a 4 KiB mapping of `frame` at `va`.
    pub fn map(&mut self, va: u64, frame: Pfn, flags: PteFlags) -> Result<(), MapError> {
        check_va(va, Level::Leaf)?;
        if flags.contains(PteFlags::HUGE) {
            return Err(MapError::InvalidFlags);
        }
        install(self.pte_slot(va)?, Entry::Leaf(PageMapping::new(frame, flags)))
    }

    /// Installs a huge mapping at the upper (1 GiB) or middle (2 MiB) level.
    pub fn map_huge(
        &mut self,
        va: u64,
        level: Level,
        frame: Pfn,
        flags: PteFlags,
    ) -> Result<(), MapError> {
        if !level.allows_huge() {
            return Err(MapError::InvalidFlags);
        }
        check_va(va, level)?;
        let mapping = PageMapping::new(frame, flags | PteFlags::HUGE);
        match level {
            Level::Upper => install(self.pud_slot(va)?, Entry::Leaf(mapping)),
            _ => install(self.pmd_slot(va)?, Entry::Leaf(mapping)),
        }
    }

    /// Records a swapped-out page at `va`.
    pub fn map_swap(&mut self, va: u64, swap: SwapEntry) -> Result<(), MapError> {
        check_va(va, Level::Leaf)?;
        install(self.pte_slot(va)?, Entry::Swap(swap))
    }

    /// Installs a decoded hardware word at `level`.
    ///
    /// A zero word clears the slot, dropping any subtree below it. Words that
    /// point at a lower table are rejected with [`MapError::InvalidFlags`].
    pub fn install_raw(&mut self, va: u64, level: Level, raw: RawEntry) -> Result<(), MapError> {
        check_va(va, level)?;
        match level {
            Level::Root => place(self.root.slot_mut(Level::Root, va), level, raw),
            Level::Upper => place(self.pud_slot(va)?, level, raw),
            Level::Middle => place(self.pmd_slot(va)?, level, raw),
            Level::Leaf => place(self.pte_slot(va)?, level, raw),
        }
    }

    /// Returns the level and hardware word of the terminal entry covering `va`.
    pub fn lookup(&self, va: u64) -> Option<(Level, RawEntry)> {
        if va >= ADDRESS_SPACE_SIZE {
            return None;
        }
        let pud = match self.root.slot(Level::Root, va) {
            Entry::Next(table) => table,
            other => return terminal(Level::Root, other),
        };
        let pmd = match pud.slot(Level::Upper, va) {
            Entry::Next(table) => table,
            other => return terminal(Level::Upper, other),
        };
        let pte = match pmd.slot(Level::Middle, va) {
            Entry::Next(table) => table,
            other => return terminal(Level::Middle, other),
        };
        terminal(Level::Leaf, pte.slot(Level::Leaf, va))
    }

    /// Removes the leaf, swap, or huge entry covering `va` and returns it.
    pub fn unmap(&mut self, va: u64) -> Option<(Level, RawEntry)> {
        if va >= ADDRESS_SPACE_SIZE {
            return None;
        }
        let Entry::Next(pud) = self.root.slot_mut(Level::Root, va) else {
            return None;
        };
        let slot = pud.slot_mut(Level::Upper, va);
        if matches!(slot, Entry::Leaf(_)) {
            return take(Level::Upper, slot);
        }
        let Entry::Next(pmd) = slot else {
            return None;
        };
        let slot = pmd.slot_mut(Level::Middle, va);
        if matches!(slot, Entry::Leaf(_)) {
            return take(Level::Middle, slot);
        }
        let Entry::Next(pte) = slot else {
            return None;
        };
        take(Level::Leaf, pte.slot_mut(Level::Leaf, va))
    }

    fn pud_slot(&mut self, va: u64) -> Result<&mut Entry<PmdTable>, MapError> {
        let pud = descend(self.root.slot_mut(Level::Root, va))?;
        Ok(pud.slot_mut(Level::Upper, va))
    }

    fn pmd_slot(&mut self, va: u64) -> Result<&mut Entry<PteTable>, MapError> {
        let pmd = descend(self.pud_slot(va)?)?;
        Ok(pmd.slot_mut(Level::Middle, va))
    }

    fn pte_slot(&mut self, va: u64) -> Result<&mut Entry<Terminal>, MapError> {
        let pte = descend(self.pmd_slot(va)?)?;
        Ok(pte.slot_mut(Level::Leaf, va))
    }
}

fn check_va(va: u64, level: Level) -> Result<(), MapError> {
    if va % level.span() != 0 {
        return Err(MapError::Unaligned);
    }
    if va >= ADDRESS_SPACE_SIZE {
        return Err(MapError::OutOfRange);
    }
    Ok(())
}

/// Follows `slot` to its child table, allocating one when the slot is absent.
fn descend<C>(slot: &mut Entry<Table<C>>) -> Result<&mut Table<C>, MapError> {
    if slot.is_absent() {
        *slot = Entry::Next(Box::default());
    }
    match slot {
        Entry::Next(table) => Ok(table.as_mut()),
        _ => Err(MapError::Overlap),
    }
}

fn install<C>(slot: &mut Entry<C>, entry: Entry<C>) -> Result<(), MapError> {
    if !slot.is_absent() {
        return Err(MapError::Overlap);
    }
    *slot = entry;
    Ok(())
}

fn place<C>(slot: &mut Entry<C>, level: Level, raw: RawEntry) -> Result<(), MapError> {
    if raw.is_none() {
        *slot = Entry::Absent;
        return Ok(());
    }
    let entry = Entry::from_raw(raw, level).ok_or(MapError::InvalidFlags)?;
    install(slot, entry)
}

fn terminal<C>(level: Level, entry: &Entry<C>) -> Option<(Level, RawEntry)> {
    match entry {
        Entry::Absent => None,
        other => other.to_raw().map(|raw| (level, raw)),
    }
}

fn take<C>(level: Level, slot: &mut Entry<C>) -> Option<(Level, RawEntry)> {
    match core::mem::take(slot) {
        Entry::Absent => None,
        other => other.to_raw().map(|raw| (level, raw)),
    }
}
