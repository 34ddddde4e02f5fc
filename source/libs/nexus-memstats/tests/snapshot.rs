// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Snapshot loading tests for nexus-memstats
//! OWNERS: @kernel-mm-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 3 integration tests
//!
//! TEST_SCOPE:
//!   - TOML schema: frames, processes, regions, pages, swap and raw words
//!   - Building the process and frame tables from a snapshot
//!
//! TEST_SCENARIOS:
//!   - builds_reportable_system(): every entry kind reaches the report
//!   - load_reads_from_disk(): Snapshot::load on a temporary file
//!   - overlapping_regions_fail_to_build(): region overlap surfaces as an error
use nexus_memstats::{Error, Pid, Snapshot};

const SYSTEM: &str = r#"
[[frame]]
pfn = 0x100
refs = 2

[[process]]
pid = 1
comm = "init"

[[process.region]]
start = 0x400000
end = 0x402000
perms = "r-xp"
exec_image = true
file = "/sbin/init"

[[process.region]]
start = 0x600000
end = 0x604000
perms = "rw-s"
locked = true

[[process.page]]
va = 0x400000
pfn = 0x100

[[process.page]]
va = 0x600000
pfn = 0x101
writable = true
user = false

[[process.page]]
va = 0x40000000
pfn = 0x200
writable = true
huge = true

[[process.swap]]
va = 0x601000
swap_type = 1
offset = 9

[[process.swap]]
va = 0x602000
swap_type = 0

[[process.raw]]
va = 0x603000
level = "leaf"
value = "0x8000000000102067"

[[process.raw]]
va = 0x200000
level = "middle"
value = "0x6"

[[process]]
pid = 2
comm = "kthreadd"
kernel_thread = true
"#;

#[test]
fn builds_reportable_system() {
    let file = Snapshot::from_toml_str(SYSTEM).expect("parse").build().expect("build");
    assert_eq!(file.processes().pids(), vec![Pid(1), Pid(2)]);

    let text = file.read(Pid(1)).expect("report");
    for line in [
        "\tTotal VMAs: 2\n",
        "\tBiggest VMA Size: 16384\n",
        "\tWritable VMAs: 1\n",
        "\tShared VMAs: 1\n",
        "\tPrivate VMAs: 1\n",
        "\tLocked VMAs: 1\n",
        "\tExecutable Image VMAs: 1\n",
        "\tFile Backed VMAs: 1\n",
        "\tAnonymous VMAs: 1\n",
        "\tNumber of Pages Swapped Out: 1\n",
        "\tRead-Only Pages: 1\n",
        "\tWritable Pages: 3\n",
        "\tNumber of Shared Pages: 1\n",
        "\tNumber of Special Pages: 1\n",
        "\tNumber of Huge Pages: 1\n",
        "\tTotal Physical Pages: 8\n",
    ] {
        assert!(text.contains(line), "missing {line:?} in\n{text}");
    }

    let err = file.read(Pid(2)).unwrap_err();
    assert!(matches!(err, Error::NoAddressSpace { .. }));
}

#[test]
fn load_reads_from_disk() {
    let dir = std::env::temp_dir().join(format!("memstats-snapshot-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("tmp dir");
    let path = dir.join("system.toml");
    std::fs::write(&path, SYSTEM).expect("write");
    let snapshot = Snapshot::load(&path).expect("load");
    assert_eq!(snapshot.processes.len(), 2);
    assert_eq!(snapshot.frames.len(), 1);
    std::fs::remove_dir_all(&dir).expect("cleanup");

    assert!(matches!(Snapshot::load(dir.join("missing.toml")), Err(Error::Io(_))));
}

#[test]
fn overlapping_regions_fail_to_build() {
    let text = r#"
        [[process]]
        pid = 9
        comm = "bad"

        [[process.region]]
        start = 0x1000
        end = 0x3000
        perms = "rw-p"

        [[process.region]]
        start = 0x2000
        end = 0x4000
        perms = "r--p"
    "#;
    let err = Snapshot::from_toml_str(text).expect("parse").build().unwrap_err();
    assert!(matches!(err, Error::Region(_)));
}
