// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host tool printing /proc/<pid>/memstats reports from a snapshot
//! INTENT: Inspect region and page-table statistics without booting a kernel
//! DEPS: nexus-memstats (model + report), clap (CLI), env_logger (log sink)
//! READINESS: Command-line tool; reads one TOML snapshot
//! TESTS: Argument parsing; report rendering over fixtures/sample.toml

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::LevelFilter;
use nexus_memstats::{MemstatsFile, Pid, Snapshot};

#[derive(Debug, Parser)]
#[command(name = "memstats", about = "Per-process memory statistics from a system snapshot")]
struct Cli {
    /// TOML snapshot describing frames and processes.
    #[arg(long, value_name = "FILE")]
    snapshot: PathBuf,
    /// Report only these pids (repeatable); default is every process.
    #[arg(long = "pid", value_name = "PID")]
    pids: Vec<u32>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok((text, failures)) => {
            print!("{text}");
            if failures == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("memstats: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

/// Loads the snapshot and renders the requested reports. Returns the text
/// and the number of pids whose report failed.
fn run(cli: &Cli) -> anyhow::Result<(String, usize)> {
    let snapshot = Snapshot::load(&cli.snapshot)
        .with_context(|| format!("loading {}", cli.snapshot.display()))?;
    let file = snapshot.build().context("building snapshot")?;
    let pids = if cli.pids.is_empty() {
        file.processes().pids()
    } else {
        cli.pids.iter().copied().map(Pid).collect()
    };
    render(&file, &pids)
}

fn render(file: &MemstatsFile, pids: &[Pid]) -> anyhow::Result<(String, usize)> {
    let mut out = String::new();
    let mut failures = 0;
    for &pid in pids {
        let comm = file.processes().get(pid).map(|task| task.comm().to_owned());
        writeln!(out, "== pid {pid} ({}) ==", comm.as_deref().unwrap_or("?"))?;
        if let Err(err) = file.show(&mut out, pid) {
            failures += 1;
            eprintln!("memstats: pid {pid}: {err} (errno {})", err.errno());
        }
    }
    Ok((out, failures))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample.toml")
    }

    #[test]
    fn parses_repeated_pids_and_verbosity() {
        let cli = Cli::try_parse_from([
            "memstats", "--snapshot", "snap.toml", "--pid", "1", "--pid", "7", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.snapshot, PathBuf::from("snap.toml"));
        assert_eq!(cli.pids, vec![1, 7]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn snapshot_is_required() {
        assert!(Cli::try_parse_from(["memstats", "--pid", "1"]).is_err());
        assert!(Cli::try_parse_from(["memstats", "--snapshot", "s.toml", "--pid", "x"]).is_err());
    }

    #[test]
    fn reports_every_process_by_default() {
        let cli = Cli::try_parse_from(["memstats", "--snapshot", sample().to_str().unwrap()])
            .unwrap();
        let (text, failures) = run(&cli).unwrap();
        // The kernel thread has no address space.
        assert_eq!(failures, 1);
        assert!(text.starts_with("== pid 1 (init) ==\nVirtual Memory Area Stats:\n"));
        assert!(text.contains("== pid 2 (kthreadd) ==\n== pid 7 (worker) ==\n"));
        assert_eq!(text.matches("Physical Pages Stats:").count(), 2);
    }

    #[test]
    fn selected_pid_report() {
        let cli = Cli::try_parse_from([
            "memstats",
            "--snapshot",
            sample().to_str().unwrap(),
            "--pid",
            "7",
        ])
        .unwrap();
        let (text, failures) = run(&cli).unwrap();
        assert_eq!(failures, 0);
        for line in [
            "\tTotal VMAs: 1\n",
            "\tShared VMAs: 1\n",
            "\tLocked VMAs: 1\n",
            "\tNumber of Pages Swapped Out: 1\n",
            "\tWritable Pages: 2\n",
            "\tNumber of Shared Pages: 1\n",
            "\tNumber of Special Pages: 1\n",
            "\tTotal Physical Pages: 5\n",
        ] {
            assert!(text.contains(line), "missing {line:?}");
        }
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let cli = Cli::try_parse_from(["memstats", "--snapshot", "/nonexistent/snap.toml"])
            .unwrap();
        let err = run(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("loading /nonexistent/snap.toml"));
    }

    #[test]
    fn unknown_pid_counts_as_failure() {
        let file = Snapshot::load(sample()).unwrap().build().unwrap();
        let (text, failures) = render(&file, &[Pid(999)]).unwrap();
        assert_eq!(failures, 1);
        assert_eq!(text, "== pid 999 (?) ==\n");
    }
}
