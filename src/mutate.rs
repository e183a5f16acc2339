// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Random structural and parametric variants of a base topology.
//!
//! Every draw comes from the RNG handle passed in, so a fixed seed
//! and a fixed call order reproduce the same variants. The base
//! topology is only ever read; each variant owns a fresh clone.

use crate::netlist::{DeviceKind, Topology};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Range of the uniform scaling factors.
pub const SCALE_RANGE: RangeInclusive<f64> = 0.5..=2.0;

/// The kind of one mutation draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Delete one transistor.
    RemoveDevice,
    /// Scale W and L of one transistor by independent factors.
    ScaleTransistor,
    /// Scale the value of one resistor or capacitor.
    ScalePassive,
}

impl MutationKind {
    pub const ALL: [MutationKind; 3] = [
        MutationKind::RemoveDevice,
        MutationKind::ScaleTransistor,
        MutationKind::ScalePassive,
    ];
}

/// A topology together with its provenance.
#[derive(Debug, Clone)]
pub struct Variant {
    /// `<base>_orig` or `<base>_varNNN`.
    pub variant_id: String,
    /// `None` for the unmodified base circuit.
    pub mutation_kind: Option<MutationKind>,
    pub topology: Topology,
}

impl Variant {
    /// Wrap the base circuit itself as the zero-mutation variant.
    pub fn original(base_name: &str, topology: &Topology) -> Variant {
        Variant {
            variant_id: format!("{}_orig", base_name),
            mutation_kind: None,
            topology: topology.clone(),
        }
    }
}

/// Apply one uniformly chosen mutation to a clone of `base`.
///
/// Exactly one draw picks the kind; the chosen operation then draws
/// what it needs. When there is no eligible device, the clone is
/// returned unchanged but still tagged with the drawn kind.
pub fn mutate(
    base: &Topology, variant_id: String, rng: &mut impl Rng
) -> Variant {
    let kind = MutationKind::ALL[rng.gen_range(0..MutationKind::ALL.len())];
    let topology = match kind {
        MutationKind::RemoveDevice => remove_transistor(base.clone(), rng),
        MutationKind::ScaleTransistor => scale_transistor(base.clone(), rng),
        MutationKind::ScalePassive => scale_passive(base.clone(), rng),
    };
    Variant { variant_id, mutation_kind: Some(kind), topology }
}

/// Build `[original] + num_variants` mutated variants of one base circuit.
///
/// Draws are strictly sequential on `rng`.
pub fn generate_variants(
    base_name: &str, base: &Topology,
    num_variants: usize, rng: &mut impl Rng
) -> Vec<Variant> {
    let mut variants = Vec::with_capacity(num_variants + 1);
    variants.push(Variant::original(base_name, base));
    for i in 0..num_variants {
        let variant = mutate(base, format!("{}_var{:03}", base_name, i), rng);
        clilog::trace!("{}: {:?}", variant.variant_id,
                       variant.mutation_kind);
        variants.push(variant);
    }
    variants
}

fn remove_transistor(mut topology: Topology, rng: &mut impl Rng) -> Topology {
    let candidates = topology.device_indices_where(DeviceKind::is_transistor);
    if let Some(&idx) = candidates.choose(rng) {
        topology.remove_device(idx);
    }
    topology
}

fn scale_transistor(mut topology: Topology, rng: &mut impl Rng) -> Topology {
    let candidates = topology.device_indices_where(DeviceKind::is_transistor);
    let Some(&idx) = candidates.choose(rng) else {
        return topology
    };
    // both factors are drawn even if a parameter turns out absent.
    let s_w = rng.gen_range(SCALE_RANGE);
    let s_l = rng.gen_range(SCALE_RANGE);
    topology.scale_param(idx, "W", s_w);
    topology.scale_param(idx, "L", s_l);
    topology
}

fn scale_passive(mut topology: Topology, rng: &mut impl Rng) -> Topology {
    let candidates = topology.device_indices_where(DeviceKind::is_passive);
    let Some(&idx) = candidates.choose(rng) else {
        return topology
    };
    let scale = rng.gen_range(SCALE_RANGE);
    if let Some(key) = topology.devices()[idx].kind.value_param() {
        topology.scale_param(idx, key, scale);
    }
    topology
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;

    const FIVE_T_OTA: &str = include_str!("../tests/data/five_t_ota.cir");

    fn ota() -> Topology {
        Topology::parse_str(FIVE_T_OTA).unwrap()
    }

    #[test]
    fn test_same_seed_same_variants() {
        let base = ota();
        let mut rng_a = ChaCha20Rng::seed_from_u64(7);
        let mut rng_b = ChaCha20Rng::seed_from_u64(7);
        let a = generate_variants("ota", &base, 20, &mut rng_a);
        let b = generate_variants("ota", &base, 20, &mut rng_b);
        assert_eq!(a.len(), 21);
        for (va, vb) in a.iter().zip(b.iter()) {
            assert_eq!(va.variant_id, vb.variant_id);
            assert_eq!(va.mutation_kind, vb.mutation_kind);
            assert_eq!(va.topology, vb.topology);
        }
        assert_eq!(a[0].variant_id, "ota_orig");
        assert_eq!(a[0].mutation_kind, None);
        assert_eq!(a[1].variant_id, "ota_var000");
        assert_eq!(a[20].variant_id, "ota_var019");
    }

    #[test]
    fn test_base_is_never_touched() {
        let base = ota();
        let snapshot = base.clone();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for i in 0..50 {
            mutate(&base, format!("v{}", i), &mut rng);
        }
        assert_eq!(base, snapshot);
    }

    #[test]
    fn test_mutation_invariants() {
        let base = ota();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            let v = mutate(&base, format!("v{}", i), &mut rng);
            let kind = v.mutation_kind.unwrap();
            seen.insert(kind);
            match kind {
                MutationKind::RemoveDevice => {
                    assert_eq!(v.topology.num_devices(), base.num_devices() - 1);
                    // only transistors are ever removed
                    let passives = |t: &Topology| t.device_indices_where(DeviceKind::is_passive).len();
                    assert_eq!(passives(&v.topology), passives(&base));
                },
                MutationKind::ScaleTransistor | MutationKind::ScalePassive => {
                    assert_eq!(v.topology.num_devices(), base.num_devices());
                    let mut changed = 0;
                    for (d, b) in v.topology.devices().iter().zip(base.devices()) {
                        assert_eq!(d.name, b.name);
                        assert_eq!(d.terminals, b.terminals);
                        assert_eq!(d.params.len(), b.params.len());
                        for (k, &val) in &d.params {
                            let ratio = val / b.params[k];
                            if ratio != 1. {
                                changed += 1;
                                assert!(ratio >= 0.5 - 1e-12 && ratio <= 2. + 1e-12);
                                assert_eq!(d.kind.is_transistor(),
                                           kind == MutationKind::ScaleTransistor);
                            }
                        }
                    }
                    assert!(changed <= 2);
                },
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_empty_pools_are_noops() {
        let passives_only = Topology::parse_str("R1 a b 1k\nC1 b 0 1p").unwrap();
        let transistors_only = Topology::parse_str("M1 d g s b nmos W=1u").unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for i in 0..60 {
            let v = mutate(&passives_only, format!("p{}", i), &mut rng);
            if v.mutation_kind != Some(MutationKind::ScalePassive) {
                assert_eq!(v.topology, passives_only);
            }
            let v = mutate(&transistors_only, format!("t{}", i), &mut rng);
            match v.mutation_kind {
                Some(MutationKind::ScalePassive) => assert_eq!(v.topology, transistors_only),
                Some(MutationKind::RemoveDevice) => assert_eq!(v.topology.num_devices(), 0),
                // L is absent and must stay absent
                _ => assert!(v.topology.devices()[0].param("L").is_none()),
            }
        }
    }
}
