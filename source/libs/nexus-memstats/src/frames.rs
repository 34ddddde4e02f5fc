// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Physical page descriptors: how many mappings reference each frame.

use std::collections::HashMap;

use log::warn;
use parking_lot::RwLock;

use crate::paging::Pfn;

/// Source of per-frame reference counts consulted by the leaf classifier.
pub trait FrameRefs {
    /// Number of mappings referencing `frame`, or `None` when the frame has
    /// no page descriptor (device memory, holes).
    fn ref_count(&self, frame: Pfn) -> Option<u32>;
}

/// System-wide frame table.
#[derive(Debug, Default)]
pub struct FrameTable {
    refs: RwLock<HashMap<Pfn, u32>>,
}

impl FrameTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the reference count of `frame`; zero drops the descriptor.
    pub fn set_ref_count(&self, frame: Pfn, count: u32) {
        let mut refs = self.refs.write();
        if count == 0 {
            refs.remove(&frame);
        } else {
            refs.insert(frame, count);
        }
    }

    /// Takes a reference on `frame` and returns the new count.
    pub fn get_page(&self, frame: Pfn) -> u32 {
        let mut refs = self.refs.write();
        let count = refs.entry(frame).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Drops a reference on `frame` and returns the remaining count.
    pub fn put_page(&self, frame: Pfn) -> u32 {
        let mut refs = self.refs.write();
        match refs.get_mut(&frame) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                refs.remove(&frame);
                0
            }
            None => {
                warn!("put_page on untracked frame {frame}");
                0
            }
        }
    }

    /// Number of frames with a live descriptor.
    pub fn len(&self) -> usize {
        self.refs.read().len()
    }

    /// Returns true when no frame is tracked.
    pub fn is_empty(&self) -> bool {
        self.refs.read().is_empty()
    }
}

impl FrameRefs for FrameTable {
    fn ref_count(&self, frame: Pfn) -> Option<u32> {
        self.refs.read().get(&frame).copied()
    }
}

impl<T: FrameRefs + ?Sized> FrameRefs for &T {
    fn ref_count(&self, frame: Pfn) -> Option<u32> {
        (**self).ref_count(frame)
    }
}
