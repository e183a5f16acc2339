// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Batch ngspice runs and measurement extraction.
//!
//! [Simulator::simulate] never fails. A missing binary, a non-zero
//! exit, a timeout or a measurement that is not in the log all end in
//! zeros for the affected entries of the [PerformanceVector].

use crate::netlist::Topology;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempdir::TempDir;

/// Measurement names, in [PerformanceVector] order.
pub const MEASURE_KEYS: [&str; 4] = ["A0_db", "UGBW_Hz", "PM_deg", "ID_A"];

/// Lines of the `.control` block appended to every simulation deck.
const CONTROL_LINES: [&str; 10] = [
    ".control",
    "set filetype=ascii",
    "op",
    "ac dec 100 10 1e9",
    "meas ac A0_db FIND vdb(VOUT) AT=10",
    "meas ac UGBW_Hz WHEN vdb(VOUT)=0",
    "meas ac PM_deg FIND phase(VOUT) WHEN vdb(VOUT)=0",
    "meas op ID_A PARAM -I(VDD)",
    "quit",
    ".endc",
];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Simulated small-signal performance of one circuit.
///
/// All zeros is what a failed simulation produces. It is scored like
/// any other measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceVector {
    /// Open-loop gain at 10 Hz, dB.
    pub a0_db: f64,
    /// Unity-gain bandwidth, Hz.
    pub ugbw_hz: f64,
    /// Phase margin at unity gain, degrees.
    pub pm_deg: f64,
    /// Supply current, A.
    pub id_a: f64,
}

impl PerformanceVector {
    pub const ZERO: PerformanceVector = PerformanceVector {
        a0_db: 0., ugbw_hz: 0., pm_deg: 0., id_a: 0.
    };

    /// Values in [MEASURE_KEYS] order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.a0_db, self.ugbw_hz, self.pm_deg, self.id_a]
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    fn set(&mut self, key_idx: usize, value: f64) {
        match key_idx {
            0 => self.a0_db = value,
            1 => self.ugbw_hz = value,
            2 => self.pm_deg = value,
            3 => self.id_a = value,
            _ => unreachable!()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// ngspice executable, looked up in PATH when not absolute.
    pub executable: String,
    /// A run still going after this long is killed and counts as failed.
    pub timeout: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            executable: "ngspice".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Why a run produced no log. Only used for diagnostics.
#[derive(Debug)]
enum SimFailure {
    NotFound(io::Error),
    Spawn(io::Error),
    Exit(ExitStatus),
    Timeout(Duration),
    Io(io::Error),
}

impl std::fmt::Display for SimFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimFailure::NotFound(e) => write!(f, "executable not found: {}", e),
            SimFailure::Spawn(e) => write!(f, "cannot start: {}", e),
            SimFailure::Exit(status) => write!(f, "exited with {}", status),
            SimFailure::Timeout(t) => write!(f, "killed after {:?}", t),
            SimFailure::Io(e) => write!(f, "scratch file error: {}", e),
        }
    }
}

impl From<io::Error> for SimFailure {
    fn from(e: io::Error) -> Self {
        SimFailure::Io(e)
    }
}

/// Runs ngspice in batch mode, one subprocess per call.
///
/// Calls share no state, so a `&Simulator` can be used from many
/// threads at once.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    pub config: SimulatorConfig,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Simulator {
        Simulator { config }
    }

    /// Simulate a topology. `tag` names the scratch files and the log
    /// messages; the variant id is a good choice.
    pub fn simulate(&self, topology: &Topology, tag: &str) -> PerformanceVector {
        let deck = simulation_deck(topology, tag);
        match self.run_batch(&deck, tag) {
            Ok(log_text) => {
                let perf = parse_measures(&log_text);
                clilog::debug!("{}: {:?}", tag, perf);
                perf
            },
            Err(SimFailure::NotFound(e)) => {
                clilog::warn!(SIM_NOT_FOUND,
                              "simulator `{}` not found ({}), measurements default to zero",
                              self.config.executable, e);
                PerformanceVector::ZERO
            },
            Err(e) => {
                clilog::warn!(SIM_FAILED, "{}: simulation failed ({}), measurements default to zero",
                              tag, e);
                PerformanceVector::ZERO
            }
        }
    }

    /// Write the deck into a fresh scratch directory, run
    /// `<exe> -b -o <log> <deck>` and return the log text.
    ///
    /// The scratch directory is removed when this returns, on every
    /// path. Removal errors are ignored.
    fn run_batch(&self, deck: &str, tag: &str) -> Result<String, SimFailure> {
        let scratch = TempDir::new("ampgraph_sim")?;
        let stem = scratch_stem(tag);
        let deck_path = scratch.path().join(format!("{}.cir", stem));
        let log_path = scratch.path().join(format!("{}.cir.log", stem));
        std::fs::write(&deck_path, deck)?;

        let status = self.run_with_timeout(&deck_path, &log_path)?;
        if !status.success() {
            return Err(SimFailure::Exit(status))
        }
        let log = std::fs::read(&log_path)?;
        let _ = scratch.close();
        Ok(String::from_utf8_lossy(&log).into_owned())
    }

    fn run_with_timeout(
        &self, deck_path: &Path, log_path: &Path
    ) -> Result<ExitStatus, SimFailure> {
        let mut child = Command::new(&self.config.executable)
            .arg("-b")
            .arg("-o").arg(log_path)
            .arg(deck_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => SimFailure::NotFound(e),
                _ => SimFailure::Spawn(e)
            })?;
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status)
            }
            if start.elapsed() > self.config.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SimFailure::Timeout(self.config.timeout))
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Full input deck: a title line (ngspice never reads the first line
/// as a device), the devices, the measurement block, then `.end`.
pub fn simulation_deck(topology: &Topology, title: &str) -> String {
    let mut deck = format!("* {}\n", title);
    for device in topology.devices() {
        deck.push_str(&device.to_netlist_line());
        deck.push('\n');
    }
    deck.push_str(&control_block());
    deck.push_str(".end\n");
    deck
}

/// The measurement `.control` block, newline terminated.
pub fn control_block() -> String {
    let mut block = CONTROL_LINES.join("\n");
    block.push('\n');
    block
}

/// Restrict scratch file names to a safe character set.
fn scratch_stem(tag: &str) -> String {
    let stem: String = tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() { "deck".to_string() } else { stem }
}

/// Extract `KEY = number` for every measurement key.
///
/// Keys match case-insensitively (ngspice prints measure names in
/// lower case). The first occurrence followed by `=` wins, even if
/// its number then fails to parse. Missing keys stay zero.
pub fn parse_measures(log_text: &str) -> PerformanceVector {
    let text = log_text.to_ascii_lowercase();
    let mut perf = PerformanceVector::ZERO;
    for (key_idx, key) in MEASURE_KEYS.iter().enumerate() {
        if let Some(number) = find_assignment(&text, &key.to_ascii_lowercase()) {
            if let Ok(v) = number.parse::<f64>() {
                perf.set(key_idx, v);
            }
        }
    }
    perf
}

/// The number token in the first `key\s*=\s*[-+e0-9.]+` of `text`.
fn find_assignment<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    let is_space = |c: char| c.is_ascii_whitespace();
    let is_num = |c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | 'e' | '.');
    let mut from = 0;
    while let Some(pos) = text[from..].find(key) {
        let after_key = from + pos + key.len();
        from = from + pos + 1;
        let rest = text[after_key..].trim_start_matches(is_space);
        let Some(rest) = rest.strip_prefix('=') else {
            continue
        };
        let rest = rest.trim_start_matches(is_space);
        let len = rest.find(|c: char| !is_num(c)).unwrap_or(rest.len());
        if len > 0 {
            return Some(&rest[..len])
        }
    }
    None
}
