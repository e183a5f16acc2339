// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Bipartite net/device graph with fixed-width features.
//!
//! Node layout: all nets first (sorted by name), then all devices in
//! topology order. Both node kinds share one feature width.
//!
//! Net node features:
//! `[VINP, VINN, VOUT, VDD, VSS, internal, 0, 0, 0]`
//!
//! Device node features:
//! `[NMOS, PMOS, R, C, log10 W, log10 L, M, log10 R, log10 C]`
//!
//! Every device terminal gives two directed edges (device to net and
//! net to device) with the same one-hot pin role `[D, G, S, B, P, N]`.

use crate::netlist::{Device, DeviceKind, Topology};
use crate::units::safe_log10;
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Net names that get their own one-hot slot, compared
/// case-insensitively.
pub const SPECIAL_NETS: [&str; 5] = ["VINP", "VINN", "VOUT", "VDD", "VSS"];

/// Number of scalar features after the device kind one-hot.
const NUM_DEVICE_SCALARS: usize = 5;

pub const NET_FEATURE_DIM: usize = SPECIAL_NETS.len() + 1;
pub const DEVICE_FEATURE_DIM: usize = DeviceKind::ALL.len() + NUM_DEVICE_SCALARS;
pub const NODE_FEATURE_DIM: usize = max_dim(NET_FEATURE_DIM, DEVICE_FEATURE_DIM);
pub const EDGE_FEATURE_DIM: usize = PinRole::ALL.len();

const fn max_dim(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// Role of a device terminal, used as the edge feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinRole {
    Drain,
    Gate,
    Source,
    Bulk,
    Positive,
    Negative,
}

impl PinRole {
    pub const ALL: [PinRole; 6] = [
        PinRole::Drain, PinRole::Gate, PinRole::Source, PinRole::Bulk,
        PinRole::Positive, PinRole::Negative
    ];

    /// Role of terminal `pin_idx` on a device of `kind`.
    ///
    /// Out-of-range pins have no role.
    pub fn of(kind: DeviceKind, pin_idx: usize) -> Option<PinRole> {
        match (kind, pin_idx) {
            (DeviceKind::Nmos | DeviceKind::Pmos, 0) => Some(PinRole::Drain),
            (DeviceKind::Nmos | DeviceKind::Pmos, 1) => Some(PinRole::Gate),
            (DeviceKind::Nmos | DeviceKind::Pmos, 2) => Some(PinRole::Source),
            (DeviceKind::Nmos | DeviceKind::Pmos, 3) => Some(PinRole::Bulk),
            (DeviceKind::Resistor | DeviceKind::Capacitor, 0) => Some(PinRole::Positive),
            (DeviceKind::Resistor | DeviceKind::Capacitor, 1) => Some(PinRole::Negative),
            _ => None
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Net,
    Device,
}

/// Encoded circuit graph.
///
/// `edge_index[e]` is a `(src, dst)` node pair with features
/// `edge_attr[e]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Node features, each of length [NODE_FEATURE_DIM].
    pub x: Vec<Vec<f32>>,
    pub node_type: Vec<NodeType>,
    pub edge_index: Vec<(usize, usize)>,
    /// Edge features, each of length [EDGE_FEATURE_DIM].
    pub edge_attr: Vec<Vec<f32>>,
    /// Net names in node order (the first `net_names.len()` nodes).
    pub net_names: Vec<CompactString>,
    /// Device name to node index. A repeated name maps to its last
    /// device node.
    pub device_indices: IndexMap<CompactString, usize>,
}

impl Graph {
    pub fn num_nodes(&self) -> usize {
        self.x.len()
    }

    pub fn num_nets(&self) -> usize {
        self.net_names.len()
    }

    /// Counts device nodes, so devices sharing a name are all counted.
    pub fn num_devices(&self) -> usize {
        self.node_type.iter().filter(|t| **t == NodeType::Device).count()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_index.len()
    }

    pub fn node_feature_dim(&self) -> usize {
        NODE_FEATURE_DIM
    }

    pub fn edge_feature_dim(&self) -> usize {
        EDGE_FEATURE_DIM
    }

    /// Node indices of all device nodes, ascending.
    pub fn device_nodes(&self) -> Vec<usize> {
        self.node_type.iter().enumerate()
            .filter(|(_, t)| **t == NodeType::Device)
            .map(|(i, _)| i)
            .collect()
    }

    /// Zero the features of one node.
    pub fn zero_node(&mut self, node_idx: usize) {
        self.x[node_idx].iter_mut().for_each(|v| *v = 0.);
    }
}

/// Encode a topology. Total: terminals referencing a net outside the
/// net set are dropped rather than reported.
pub fn encode(topology: &Topology) -> Graph {
    let mut net_names = topology.nets().iter().cloned().collect::<Vec<_>>();
    net_names.sort_unstable();
    let net_indices = net_names.iter().enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect::<IndexMap<_, _>>();

    let mut x = Vec::with_capacity(net_names.len() + topology.num_devices());
    let mut node_type = Vec::with_capacity(x.capacity());
    for net in &net_names {
        x.push(net_features(net));
        node_type.push(NodeType::Net);
    }

    let mut device_indices = IndexMap::new();
    let mut edge_index = Vec::new();
    let mut edge_attr = Vec::new();
    for device in topology.devices() {
        let dev_idx = x.len();
        x.push(device_features(device));
        node_type.push(NodeType::Device);
        device_indices.insert(device.name.clone(), dev_idx);

        for (pin_idx, net) in device.terminals.iter().enumerate() {
            let Some(&net_idx) = net_indices.get(net) else {
                continue
            };
            let role = edge_feature(device.kind, pin_idx);
            edge_index.push((dev_idx, net_idx));
            edge_attr.push(role.clone());
            edge_index.push((net_idx, dev_idx));
            edge_attr.push(role);
        }
    }

    Graph { x, node_type, edge_index, edge_attr, net_names, device_indices }
}

fn net_features(net: &str) -> Vec<f32> {
    let net = net.to_ascii_uppercase();
    let mut feats = SPECIAL_NETS.iter()
        .map(|s| if net == *s { 1. } else { 0. })
        .collect::<Vec<f32>>();
    let internal = match feats.iter().any(|&f| f != 0.) {
        true => 0.,
        false => 1.
    };
    feats.push(internal);
    feats.resize(NODE_FEATURE_DIM, 0.);
    feats
}

fn device_features(device: &Device) -> Vec<f32> {
    let mut feats = DeviceKind::ALL.iter()
        .map(|&k| if device.kind == k { 1. } else { 0. })
        .collect::<Vec<f32>>();
    let p = |key: &str| device.param(key).unwrap_or(0.);
    feats.extend([
        safe_log10(p("W")),
        safe_log10(p("L")),
        p("M"),
        safe_log10(p("R")),
        safe_log10(p("C")),
    ].map(|v| v as f32));
    feats.resize(NODE_FEATURE_DIM, 0.);
    feats
}

fn edge_feature(kind: DeviceKind, pin_idx: usize) -> Vec<f32> {
    let mut feats = vec![0.; EDGE_FEATURE_DIM];
    if let Some(role) = PinRole::of(kind, pin_idx) {
        feats[role.index()] = 1.;
    }
    feats
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_T_OTA: &str = include_str!("../tests/data/five_t_ota.cir");

    #[test]
    fn test_node_ordering_and_dims() {
        let topo = Topology::parse_str(FIVE_T_OTA).unwrap();
        let g = encode(&topo);
        assert_eq!(NODE_FEATURE_DIM, 9);
        assert_eq!(g.num_nets(), 8);
        assert_eq!(g.num_devices(), 7);
        assert_eq!(g.num_nodes(), 15);
        let mut sorted = g.net_names.clone();
        sorted.sort();
        assert_eq!(g.net_names, sorted);
        assert!(g.x.iter().all(|f| f.len() == NODE_FEATURE_DIM));
        assert!(g.edge_attr.iter().all(|f| f.len() == EDGE_FEATURE_DIM));
        assert_eq!(g.device_nodes(), (8..15).collect::<Vec<_>>());
        assert_eq!(g.device_indices["M1"], 8);
        assert_eq!(g.device_indices["CL"], 14);
    }

    #[test]
    fn test_net_features_are_one_hot() {
        let topo = Topology::parse_str(FIVE_T_OTA).unwrap();
        let g = encode(&topo);
        for (i, name) in g.net_names.iter().enumerate() {
            let f = &g.x[i];
            assert_eq!(f[..NET_FEATURE_DIM].iter().sum::<f32>(), 1.);
            let internal = f[NET_FEATURE_DIM - 1] == 1.;
            let special = SPECIAL_NETS.iter().any(|s| name.eq_ignore_ascii_case(s));
            assert_eq!(internal, !special);
        }
        // lower-case special names still match
        let g = encode(&Topology::parse_str("R1 vout vdd 1k").unwrap());
        assert_eq!(g.x[0][..NET_FEATURE_DIM], [0f32, 0., 0., 1., 0., 0.]);
        assert_eq!(g.x[1][..NET_FEATURE_DIM], [0f32, 0., 1., 0., 0., 0.]);
    }

    #[test]
    fn test_device_features() {
        let topo = Topology::parse_str(
            "M1 d g s b nmos W=1u L=100n M=2\nR1 a b 1k\nC1 a b -1p"
        ).unwrap();
        let g = encode(&topo);
        let m1 = &g.x[g.device_indices["M1"]];
        assert_eq!(m1[..4], [1f32, 0., 0., 0.]);
        assert!((m1[4] + 6.).abs() < 1e-5);
        assert!((m1[5] + 7.).abs() < 1e-5);
        assert_eq!(m1[6], 2.);
        assert_eq!(m1[7..], [0f32, 0.]);
        let r1 = &g.x[g.device_indices["R1"]];
        assert_eq!(r1[..4], [0f32, 0., 1., 0.]);
        assert!((r1[7] - 3.).abs() < 1e-5);
        // non-positive values clamp to zero
        let c1 = &g.x[g.device_indices["C1"]];
        assert_eq!(c1[..], [0f32, 0., 0., 1., 0., 0., 0., 0., 0.]);
    }

    #[test]
    fn test_edges_and_roles() {
        let topo = Topology::parse_str(FIVE_T_OTA).unwrap();
        let g = encode(&topo);
        let total_pins: usize = topo.devices().iter().map(|d| d.terminals.len()).sum();
        assert_eq!(g.num_edges(), 2 * total_pins);
        assert_eq!(g.edge_attr.len(), g.num_edges());
        for (e, &(src, dst)) in g.edge_index.iter().enumerate() {
            assert_ne!(g.node_type[src], g.node_type[dst]);
            assert_eq!(g.edge_attr[e].iter().sum::<f32>(), 1.);
        }
        // first device is M1: drain edge then its reverse
        let m1 = g.device_indices["M1"];
        let n1 = g.net_names.iter().position(|n| n.as_str() == "n1").unwrap();
        assert_eq!(g.edge_index[0], (m1, n1));
        assert_eq!(g.edge_index[1], (n1, m1));
        assert_eq!(g.edge_attr[0], vec![1f32, 0., 0., 0., 0., 0.]);
        // the last edge pair belongs to CL's negative pin
        assert_eq!(g.edge_attr.last().unwrap(), &vec![0f32, 0., 0., 0., 0., 1.]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let topo = Topology::parse_str(FIVE_T_OTA).unwrap();
        assert_eq!(encode(&topo), encode(&topo));
        assert_eq!(encode(&topo), encode(&topo.clone()));
    }

    #[test]
    fn test_duplicate_device_names() {
        let topo = Topology::parse_str(
            "R1 a b 1k\nR1 b c 2k\nM1 d g s b nmos W=1u"
        ).unwrap();
        let g = encode(&topo);
        assert_eq!(g.num_devices(), 3);
        assert_eq!(g.device_nodes().len(), g.num_devices());
        assert_eq!(g.num_nodes(), g.num_nets() + 3);
        // the second R1 wins the name lookup
        assert_eq!(g.device_indices["R1"], g.num_nets() + 1);
    }

    #[test]
    fn test_empty_topology() {
        let g = encode(&Topology::default());
        assert_eq!(g.num_nodes(), 0);
        assert_eq!(g.num_edges(), 0);
        assert!(g.device_nodes().is_empty());
    }
}
