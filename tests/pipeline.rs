// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! End-to-end dataset generation without a working simulator.

use std::path::{Path, PathBuf};
use std::time::Duration;
use ampgraph::dataset::{load_dataset, DataPaths, DatasetAssembler, DatasetConfig};
use ampgraph::ngspice::SimulatorConfig;
use ampgraph::Error;
use tempdir::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data").join(name)
}

fn config(root: &Path, seed: u64) -> DatasetConfig {
    DatasetConfig {
        output_root: root.to_path_buf(),
        num_variants: 20,
        seed,
        num_threads: 2,
        simulator: SimulatorConfig {
            executable: "/nonexistent/ngspice".to_string(),
            timeout: Duration::from_secs(5),
        },
    }
}

#[test]
fn test_pipeline_without_simulator() {
    let dir = TempDir::new("ampgraph_pipeline").unwrap();
    let bases = [fixture("five_t_ota.cir"), fixture("cs_amp.cir")];
    let mut assembler = DatasetAssembler::new(config(dir.path(), 0)).unwrap();
    let (samples, pairs) = assembler.run(&bases).unwrap();

    assert_eq!(samples.len(), 42);
    assert_eq!(pairs.len(), 50);
    for p in &pairs {
        assert_eq!(samples[p.better].base_name, samples[p.worse].base_name);
        assert_ne!(p.better, p.worse);
    }
    assert!(samples.iter().all(|s| s.perf.is_zero() && s.quality_score == 0.));
    assert_eq!(samples[0].variant_id, "five_t_ota_orig");
    assert_eq!(samples[1].variant_id, "five_t_ota_var000");
    assert_eq!(samples[21].variant_id, "cs_amp_orig");
    assert_eq!(samples[41].variant_id, "cs_amp_var019");
    assert!(samples[0].mutation_kind.is_none());
    assert!(samples[1..21].iter().all(|s| s.mutation_kind.is_some()));

    let paths = DataPaths::new(dir.path());
    let csv = std::fs::read_to_string(paths.spec_table()).unwrap();
    assert_eq!(csv.lines().count(), 43);
    assert_eq!(csv.lines().next(), Some("netlist_id,A0_db,UGBW_Hz,PM_deg,ID_A"));
    for s in &samples {
        let cir = paths.generated_netlists.join(format!("{}.cir", s.variant_id));
        let text = std::fs::read_to_string(cir).unwrap();
        assert!(text.ends_with(".end"));
    }

    let loaded = load_dataset(&paths).unwrap();
    assert_eq!(loaded.samples, samples);
    assert_eq!(loaded.ranking_pairs, pairs);
}

#[test]
fn test_pipeline_is_reproducible() {
    let bases = [fixture("five_t_ota.cir")];
    let run = |seed| {
        let dir = TempDir::new("ampgraph_pipeline").unwrap();
        let mut assembler = DatasetAssembler::new(config(dir.path(), seed)).unwrap();
        assembler.run(&bases).unwrap()
    };
    let (a, pa) = run(42);
    let (b, pb) = run(42);
    assert_eq!(a, b);
    assert_eq!(pa, pb);
    let (c, _) = run(43);
    assert_ne!(a, c);
}

#[test]
fn test_parse_error_aborts() {
    let dir = TempDir::new("ampgraph_pipeline").unwrap();
    let bad = dir.path().join("bad.cir");
    std::fs::write(&bad, "* broken\nM1 a b\n.end\n").unwrap();
    let mut assembler = DatasetAssembler::new(config(dir.path(), 0)).unwrap();
    match assembler.run(&[bad]) {
        Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {:?}", other.map(|(s, _)| s.len())),
    }
}
