// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crate error type and its procfs errno mapping.

use core::fmt;
use std::io;

use crate::mm::Pid;
use crate::paging::MapError;
use crate::region::RegionError;

/// Permission denied: the task has no user address space.
pub const EACCES: i32 = 13;
/// No such process.
pub const ESRCH: i32 = 3;
/// I/O error while emitting the report.
pub const EIO: i32 = 5;
/// Invalid argument.
pub const EINVAL: i32 = 22;

/// Errors surfaced by report collection and snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Kernel thread, or the address space was already torn down.
    #[error("pid {pid} has no user address space")]
    NoAddressSpace { pid: Pid },
    /// Pid not present in the process table.
    #[error("no process with pid {pid}")]
    NoSuchProcess { pid: Pid },
    #[error("page table: {0}")]
    Map(#[from] MapError),
    #[error("region: {0}")]
    Region(#[from] RegionError),
    /// Snapshot file did not describe a buildable system.
    #[error("snapshot: {0}")]
    Snapshot(String),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// Output sink refused a write.
    #[error("report sink rejected output")]
    Render(#[from] fmt::Error),
}

impl Error {
    /// Errno a procfs read of the report fails with.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NoAddressSpace { .. } => EACCES,
            Error::NoSuchProcess { .. } => ESRCH,
            Error::Render(_) => EIO,
            Error::Map(_) | Error::Region(_) | Error::Snapshot(_) | Error::Io(_) => EINVAL,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Snapshot(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(Error::NoAddressSpace { pid: Pid(2) }.errno(), EACCES);
        assert_eq!(Error::NoSuchProcess { pid: Pid(9) }.errno(), ESRCH);
        assert_eq!(Error::Render(fmt::Error).errno(), EIO);
        assert_eq!(Error::from(MapError::Overlap).errno(), EINVAL);
        assert_eq!(Error::Snapshot("bad".into()).errno(), EINVAL);
    }

    #[test]
    fn messages_name_the_pid() {
        let err = Error::NoAddressSpace { pid: Pid(2) };
        assert_eq!(err.to_string(), "pid 2 has no user address space");
    }
}
