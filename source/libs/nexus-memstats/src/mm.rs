// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Address spaces, their reader/writer guard, and the process table.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::paging::PageTableHierarchy;
use crate::region::RegionList;

/// Process identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user address space: its page tables and its regions.
#[derive(Debug, Default)]
pub struct AddressSpace {
    page_table: PageTableHierarchy,
    regions: RegionList,
}

impl AddressSpace {
    /// Creates an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles an address space from prepared parts.
    pub fn from_parts(page_table: PageTableHierarchy, regions: RegionList) -> Self {
        Self { page_table, regions }
    }

    /// Page-table hierarchy.
    pub fn page_table(&self) -> &PageTableHierarchy {
        &self.page_table
    }

    /// Mutable page-table hierarchy.
    pub fn page_table_mut(&mut self) -> &mut PageTableHierarchy {
        &mut self.page_table
    }

    /// Region list.
    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    /// Mutable region list.
    pub fn regions_mut(&mut self) -> &mut RegionList {
        &mut self.regions
    }
}

/// Shared handle on an address space. Readers may run concurrently; a writer
/// (map, unmap, region insert) excludes them.
#[derive(Debug, Default)]
pub struct MemoryDescriptor {
    space: RwLock<AddressSpace>,
}

impl MemoryDescriptor {
    /// Wraps `space`.
    pub fn new(space: AddressSpace) -> Self {
        Self { space: RwLock::new(space) }
    }

    /// Acquires the shared guard. Dropping it releases the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, AddressSpace> {
        self.space.read()
    }

    /// Acquires the exclusive guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, AddressSpace> {
        self.space.write()
    }
}

/// A schedulable entity, optionally owning a user address space.
#[derive(Debug)]
pub struct Task {
    pid: Pid,
    comm: String,
    mm: Option<Arc<MemoryDescriptor>>,
}

impl Task {
    /// User task with address space `mm`.
    pub fn new(pid: Pid, comm: impl Into<String>, mm: Arc<MemoryDescriptor>) -> Self {
        Self { pid, comm: comm.into(), mm: Some(mm) }
    }

    /// Kernel thread; never has an address space.
    pub fn kernel_thread(pid: Pid, comm: impl Into<String>) -> Self {
        Self { pid, comm: comm.into(), mm: None }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn comm(&self) -> &str {
        &self.comm
    }

    /// Address-space descriptor, `None` for kernel threads.
    pub fn mm(&self) -> Option<&Arc<MemoryDescriptor>> {
        self.mm.as_ref()
    }
}

/// Live tasks indexed by pid.
#[derive(Debug, Default)]
pub struct ProcessTable {
    tasks: RwLock<BTreeMap<Pid, Arc<Task>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task`, replacing and returning any task with the same pid.
    pub fn insert(&self, task: Task) -> Option<Arc<Task>> {
        self.tasks.write().insert(task.pid(), Arc::new(task))
    }

    /// Looks up a task; the returned handle outlives later removal.
    pub fn get(&self, pid: Pid) -> Option<Arc<Task>> {
        self.tasks.read().get(&pid).cloned()
    }

    pub fn remove(&self, pid: Pid) -> Option<Arc<Task>> {
        self.tasks.write().remove(&pid)
    }

    /// Pids in ascending order.
    pub fn pids(&self) -> Vec<Pid> {
        self.tasks.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
