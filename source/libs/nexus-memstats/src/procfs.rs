// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! `/proc/<pid>/memstats`: renders a [`MemoryReport`](crate::MemoryReport)
//! for a pid into a text sink.

use core::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::frames::FrameTable;
use crate::mm::{Pid, ProcessTable};
use crate::report::collect;

/// Read-only report file backed by the live process and frame tables.
#[derive(Clone, Debug)]
pub struct MemstatsFile {
    processes: Arc<ProcessTable>,
    frames: Arc<FrameTable>,
}

impl MemstatsFile {
    pub fn new(processes: Arc<ProcessTable>, frames: Arc<FrameTable>) -> Self {
        Self { processes, frames }
    }

    pub fn processes(&self) -> &Arc<ProcessTable> {
        &self.processes
    }

    pub fn frames(&self) -> &Arc<FrameTable> {
        &self.frames
    }

    /// Writes the report of `pid` to `out`.
    ///
    /// Nothing is written unless the report was collected. A sink failure
    /// surfaces as [`Error::Render`].
    pub fn show(&self, out: &mut dyn fmt::Write, pid: Pid) -> Result<()> {
        let task = self.processes.get(pid).ok_or(Error::NoSuchProcess { pid })?;
        let report = collect(&task, self.frames.as_ref())?;
        write!(out, "{report}")?;
        Ok(())
    }

    /// Report of `pid` as an owned string.
    pub fn read(&self, pid: Pid) -> Result<String> {
        let mut text = String::new();
        self.show(&mut text, pid)?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EIO, ESRCH};
    use crate::mm::{MemoryDescriptor, Task};

    struct Refusing;

    impl fmt::Write for Refusing {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    fn file_with_one_task() -> MemstatsFile {
        let processes = Arc::new(ProcessTable::new());
        processes.insert(Task::new(Pid(10), "sh", Arc::new(MemoryDescriptor::default())));
        MemstatsFile::new(processes, Arc::new(FrameTable::new()))
    }

    #[test]
    fn unknown_pid_is_esrch() {
        let err = file_with_one_task().read(Pid(11)).unwrap_err();
        assert_eq!(err.errno(), ESRCH);
    }

    #[test]
    fn sink_failure_is_eio() {
        let err = file_with_one_task().show(&mut Refusing, Pid(10)).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
        assert_eq!(err.errno(), EIO);
    }

    #[test]
    fn read_renders_both_sections() {
        let text = file_with_one_task().read(Pid(10)).expect("report");
        assert!(text.contains("Virtual Memory Area Stats:\n"));
        assert!(text.contains("Physical Pages Stats:\n"));
    }
}
