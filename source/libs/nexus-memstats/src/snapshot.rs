// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! TOML system snapshots: frames, processes, their regions and page tables.
//!
//! A snapshot is loaded with [`Snapshot::load`] and turned into a live
//! [`MemstatsFile`] with [`Snapshot::build`]. Addresses and frame numbers are
//! plain TOML integers (hex literals allowed); raw page-table words are hex
//! strings so that bit 63 fits.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::frames::FrameTable;
use crate::mm::{AddressSpace, MemoryDescriptor, Pid, ProcessTable, Task};
use crate::paging::{Level, Pfn, PteFlags, RawEntry, SwapEntry};
use crate::procfs::MemstatsFile;
use crate::region::{BackingFile, VirtualMemoryRegion, VmFlags};

/// Parsed snapshot file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default, rename = "frame")]
    pub frames: Vec<FrameSpec>,
    #[serde(default, rename = "process")]
    pub processes: Vec<ProcessSpec>,
}

/// Page descriptor of one physical frame.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameSpec {
    pub pfn: u64,
    pub refs: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSpec {
    pub pid: u32,
    pub comm: String,
    #[serde(default)]
    pub kernel_thread: bool,
    #[serde(default, rename = "region")]
    pub regions: Vec<RegionSpec>,
    #[serde(default, rename = "page")]
    pub pages: Vec<PageSpec>,
    #[serde(default, rename = "swap")]
    pub swaps: Vec<SwapSpec>,
    #[serde(default, rename = "raw")]
    pub raw: Vec<RawSpec>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionSpec {
    pub start: u64,
    pub end: u64,
    /// `/proc/<pid>/maps` permission column, e.g. `r-xp`.
    pub perms: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub exec_image: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub file_offset: u64,
}

/// Present mapping. `huge` maps 2 MiB at the middle level.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageSpec {
    pub va: u64,
    pub pfn: u64,
    #[serde(default)]
    pub writable: bool,
    #[serde(default = "default_user")]
    pub user: bool,
    #[serde(default)]
    pub huge: bool,
}

fn default_user() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwapSpec {
    pub va: u64,
    pub swap_type: u8,
    #[serde(default)]
    pub offset: u64,
}

/// Raw hardware word installed verbatim at `level`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSpec {
    pub va: u64,
    pub level: String,
    pub value: String,
}

impl Snapshot {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the snapshot at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let snapshot = Self::from_toml_str(&text)?;
        info!(
            "memstats: loaded snapshot {} ({} processes, {} frames)",
            path.display(),
            snapshot.processes.len(),
            snapshot.frames.len()
        );
        Ok(snapshot)
    }

    /// Populates frame and process tables and wraps them in a report file.
    pub fn build(&self) -> Result<MemstatsFile> {
        let frames = FrameTable::new();
        for frame in &self.frames {
            frames.set_ref_count(Pfn(frame.pfn), frame.refs);
        }

        let processes = ProcessTable::new();
        let mut seen = BTreeSet::new();
        for spec in &self.processes {
            if !seen.insert(spec.pid) {
                return Err(Error::Snapshot(format!("duplicate pid {}", spec.pid)));
            }
            processes.insert(spec.build()?);
        }
        Ok(MemstatsFile::new(Arc::new(processes), Arc::new(frames)))
    }
}

impl ProcessSpec {
    fn build(&self) -> Result<Task> {
        let pid = Pid(self.pid);
        if self.kernel_thread {
            if !(self.regions.is_empty()
                && self.pages.is_empty()
                && self.swaps.is_empty()
                && self.raw.is_empty())
            {
                return Err(Error::Snapshot(format!(
                    "pid {pid}: kernel thread cannot own mappings"
                )));
            }
            return Ok(Task::kernel_thread(pid, self.comm.as_str()));
        }

        let mut space = AddressSpace::new();
        for region in &self.regions {
            space.regions_mut().insert(region.build()?)?;
        }

        let pt = space.page_table_mut();
        for page in &self.pages {
            let mut flags = PteFlags::empty();
            flags.set(PteFlags::WRITABLE, page.writable);
            flags.set(PteFlags::USER, page.user);
            let mapped = if page.huge {
                pt.map_huge(page.va, Level::Middle, Pfn(page.pfn), flags)
            } else {
                pt.map(page.va, Pfn(page.pfn), flags)
            };
            mapped.map_err(|err| placement(pid, "page", page.va, err))?;
        }
        for swap in &self.swaps {
            if swap.swap_type > SwapEntry::MAX_TYPE || swap.offset > SwapEntry::MAX_OFFSET {
                return Err(Error::Snapshot(format!(
                    "pid {pid}: swap at {:#x}: type {} / offset {:#x} not encodable",
                    swap.va, swap.swap_type, swap.offset
                )));
            }
            pt.map_swap(swap.va, SwapEntry::new(swap.swap_type, swap.offset))
                .map_err(|err| placement(pid, "swap", swap.va, err))?;
        }
        for raw in &self.raw {
            let level = parse_level(&raw.level)?;
            let value = parse_word(&raw.value)?;
            pt.install_raw(raw.va, level, RawEntry(value))
                .map_err(|err| placement(pid, "raw", raw.va, err))?;
        }

        Ok(Task::new(pid, self.comm.as_str(), Arc::new(MemoryDescriptor::new(space))))
    }
}

impl RegionSpec {
    fn build(&self) -> Result<VirtualMemoryRegion> {
        let mut flags = VmFlags::from_perms(&self.perms)?;
        flags.set(VmFlags::LOCKED, self.locked);
        flags.set(VmFlags::EXECUTABLE, self.exec_image);
        let file = self
            .file
            .as_ref()
            .map(|path| Arc::new(BackingFile { path: path.clone(), offset: self.file_offset }));
        Ok(VirtualMemoryRegion::new(self.start, self.end, flags, file)?)
    }
}

fn placement(pid: Pid, what: &str, va: u64, err: crate::paging::MapError) -> Error {
    Error::Snapshot(format!("pid {pid}: {what} at {va:#x}: {err}"))
}

fn parse_level(name: &str) -> Result<Level> {
    Level::ALL
        .into_iter()
        .find(|level| level.name() == name)
        .ok_or_else(|| Error::Snapshot(format!("unknown level `{name}`")))
}

fn parse_word(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|err| Error::Snapshot(format!("bad raw word `{text}`: {err}")))
}
