// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Flattened amplifier netlists.
//!
//! Only three device classes are understood: MOS transistors (`M`),
//! resistors (`R`) and capacitors (`C`). Every other element line
//! (sources, subcircuit calls, dot-commands we do not know) is
//! ignored, so a testbench-style netlist can be fed in directly.
//!
//! ```text
//! * comment
//! M1 vout vinp tail vss nmos_model W=1u L=0.18u M=2
//! R1 vdd vout 10k
//! C1 vout 0 1p
//! .end
//! ```

use crate::error::{Error, Result};
use crate::units::parse_value;
use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Dot-commands that are skipped without looking further.
/// Matched as case-insensitive line prefixes.
const SKIPPED_DIRECTIVES: [&str; 5] = [
    ".include", ".lib", ".control", ".end", ".model"
];

/// The closed set of device kinds.
///
/// The declaration order is also the one-hot order used by the graph
/// encoder and the class label order of the masking target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Nmos,
    Pmos,
    Resistor,
    Capacitor,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::Nmos, DeviceKind::Pmos,
        DeviceKind::Resistor, DeviceKind::Capacitor
    ];

    /// Position in [DeviceKind::ALL].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            DeviceKind::Nmos => 0,
            DeviceKind::Pmos => 1,
            DeviceKind::Resistor => 2,
            DeviceKind::Capacitor => 3,
        }
    }

    #[inline]
    pub fn is_transistor(self) -> bool {
        matches!(self, DeviceKind::Nmos | DeviceKind::Pmos)
    }

    #[inline]
    pub fn is_passive(self) -> bool {
        !self.is_transistor()
    }

    /// 4 for transistors (drain, gate, source, bulk), 2 for passives.
    #[inline]
    pub fn num_terminals(self) -> usize {
        if self.is_transistor() { 4 } else { 2 }
    }

    /// The single value parameter carried by a passive.
    pub fn value_param(self) -> Option<&'static str> {
        match self {
            DeviceKind::Resistor => Some("R"),
            DeviceKind::Capacitor => Some("C"),
            DeviceKind::Nmos | DeviceKind::Pmos => None,
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Nmos => write!(f, "NMOS"),
            DeviceKind::Pmos => write!(f, "PMOS"),
            DeviceKind::Resistor => write!(f, "R"),
            DeviceKind::Capacitor => write!(f, "C"),
        }
    }
}

/// One circuit element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Instance name, unique within a topology.
    pub name: CompactString,
    pub kind: DeviceKind,
    /// Net names in pin order: d/g/s/b or p/n.
    pub terminals: Vec<CompactString>,
    /// Parameters with uppercase keys, in source order.
    ///
    /// Transistors carry `W`, `L`, `M` etc. as written.
    /// Passives carry exactly one of `R` or `C`.
    pub params: IndexMap<CompactString, f64>,
}

impl Device {
    #[inline]
    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }

    /// One netlist line for this device, without trailing newline.
    pub fn to_netlist_line(&self) -> String {
        match self.kind {
            DeviceKind::Nmos | DeviceKind::Pmos => {
                let model_token = match self.kind {
                    DeviceKind::Nmos => "nmos",
                    _ => "pmos"
                };
                let params = self.params.iter()
                    .map(|(k, v)| format!("{}={:e}", k, v))
                    .join(" ");
                format!("{} {} {} {}",
                        self.name, self.terminals.iter().join(" "),
                        model_token, params)
                    .trim_end().to_string()
            },
            DeviceKind::Resistor | DeviceKind::Capacitor => {
                let value = self.kind.value_param()
                    .and_then(|k| self.param(k))
                    .unwrap_or(0.);
                format!("{} {} {} {:e}",
                        self.name, self.terminals[0], self.terminals[1], value)
            },
        }
    }
}

/// A parsed circuit: devices in source order plus the derived net set.
///
/// Fields are private so that the net set always equals the union
/// of all device terminals. Topologies are cloned before any mutation
/// (see [crate::mutate]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    devices: Vec<Device>,
    nets: IndexSet<CompactString>,
}

impl Topology {
    pub fn from_devices(devices: Vec<Device>) -> Topology {
        let nets = devices.iter()
            .flat_map(|d| d.terminals.iter().cloned())
            .collect();
        Topology { devices, nets }
    }

    #[inline]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Distinct net names in first-seen order.
    ///
    /// Callers that need a canonical order must sort.
    #[inline]
    pub fn nets(&self) -> &IndexSet<CompactString> {
        &self.nets
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    /// Per-kind device counts, e.g. `NMOS 3, PMOS 2, R 1`.
    /// Kinds with no device are left out.
    pub fn kind_summary(&self) -> String {
        DeviceKind::ALL.iter()
            .map(|&k| (k, self.devices.iter().filter(|d| d.kind == k).count()))
            .filter(|&(_, n)| n > 0)
            .map(|(k, n)| format!("{} {}", k, n))
            .join(", ")
    }

    /// Indices of devices accepted by `pred`, in device order.
    pub fn device_indices_where(
        &self, pred: impl Fn(DeviceKind) -> bool
    ) -> Vec<usize> {
        self.devices.iter().enumerate()
            .filter(|(_, d)| pred(d.kind))
            .map(|(i, _)| i)
            .collect()
    }

    /// Remove one device and rebuild the net set, so nets only that
    /// device touched disappear as well.
    pub fn remove_device(&mut self, idx: usize) -> Device {
        let removed = self.devices.remove(idx);
        *self = Topology::from_devices(std::mem::take(&mut self.devices));
        removed
    }

    /// Multiply one parameter of one device in place.
    ///
    /// Returns false (and changes nothing) when the parameter is absent.
    /// Terminals are never touched here.
    pub fn scale_param(&mut self, idx: usize, key: &str, factor: f64) -> bool {
        match self.devices[idx].params.get_mut(key) {
            Some(v) => {
                *v *= factor;
                true
            },
            None => false
        }
    }

    /// Serialize back to netlist text terminated by `.end`.
    pub fn to_netlist_text(&self) -> String {
        let mut text = String::new();
        for device in &self.devices {
            text.push_str(&device.to_netlist_line());
            text.push('\n');
        }
        text.push_str(".end");
        text
    }

    /// Parse a netlist file.
    pub fn parse_file(path: &Path) -> Result<Topology> {
        let content = std::fs::read_to_string(path)?;
        parse_lines(&content, path)
    }

    /// Parse netlist text held in memory.
    pub fn parse_str(input: &str) -> Result<Topology> {
        parse_lines(input, Path::new("<string>"))
    }
}

fn parse_lines(input: &str, origin: &Path) -> Result<Topology> {
    let mut devices = Vec::new();
    let mut in_control = false;
    for (line_num, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('*') || line.starts_with(';') {
            continue
        }
        let lower = line.to_ascii_lowercase();
        // simulator commands inside .control/.endc are not devices,
        // even when they begin with `m` (e.g. `meas`).
        if in_control {
            if lower.starts_with(".endc") {
                in_control = false;
            }
            continue
        }
        if lower.starts_with(".control") {
            in_control = true;
            continue
        }
        if SKIPPED_DIRECTIVES.iter().any(|d| lower.starts_with(d)) {
            continue
        }
        let err = |message: String| Error::Parse {
            path: origin.to_path_buf(),
            line: line_num + 1,
            message,
        };
        let device = match lower.as_bytes()[0] {
            b'm' => parse_mos(line).map_err(err)?,
            b'r' | b'c' => parse_passive(line).map_err(err)?,
            _ => continue
        };
        devices.push(device);
    }
    Ok(Topology::from_devices(devices))
}

/// `name d g s b model [KEY=value ...]`
fn parse_mos(line: &str) -> std::result::Result<Device, String> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < 6 {
        return Err(format!(
            "transistor line needs name, 4 terminals and a model, got {} tokens",
            tokens.len()))
    }
    let model_name = tokens[5].to_ascii_lowercase();
    let mut params = IndexMap::new();
    for token in &tokens[6..] {
        let Some((key, value)) = token.split_once('=') else {
            continue
        };
        let value = parse_value(value).map_err(|e| e.to_string())?;
        params.insert(CompactString::from(key.to_ascii_uppercase()), value);
    }
    // coarse on purpose: any model name containing an `n` is N-type,
    // which also catches P-type names like `pmos_n28`.
    let kind = match model_name.contains('n') {
        true => DeviceKind::Nmos,
        false => DeviceKind::Pmos
    };
    Ok(Device {
        name: tokens[0].into(),
        kind,
        terminals: tokens[1..5].iter().map(|&t| t.into()).collect(),
        params,
    })
}

/// `name n1 n2 value`. The kind comes from the first letter of the name.
fn parse_passive(line: &str) -> std::result::Result<Device, String> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < 4 {
        return Err(format!(
            "passive line needs name, 2 terminals and a value, got {} tokens",
            tokens.len()))
    }
    let value = parse_value(tokens[3]).map_err(|e| e.to_string())?;
    let kind = match tokens[0].as_bytes()[0].to_ascii_lowercase() {
        b'r' => DeviceKind::Resistor,
        _ => DeviceKind::Capacitor
    };
    let mut params = IndexMap::new();
    if let Some(key) = kind.value_param() {
        params.insert(CompactString::from(key), value);
    }
    Ok(Device {
        name: tokens[0].into(),
        kind,
        terminals: vec![tokens[1].into(), tokens[2].into()],
        params,
    })
}
