// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Dataset assembly: variants, simulation, scoring, graphs, masking
//! targets and ranking pairs.
//!
//! Output layout under the configured root:
//!
//! ```text
//! data/generated_netlists/<variant_id>.cir
//! data/spec_csv/specs.csv
//! data/graphs/dataset.bin          (Vec<ScoredSample>, serde_bare)
//! data/graphs/ranking_pairs.bin    (Vec<RankingPair>, serde_bare)
//! ```

use crate::error::{Error, Result};
use crate::graph::{self, Graph};
use crate::mutate::{generate_variants, MutationKind, Variant};
use crate::netlist::Topology;
use crate::ngspice::{PerformanceVector, Simulator, SimulatorConfig, MEASURE_KEYS};
use crate::score::quality_score;
use itertools::Itertools;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where the pipeline writes its artifacts.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub generated_netlists: PathBuf,
    pub spec_csv: PathBuf,
    pub graphs: PathBuf,
}

impl DataPaths {
    pub fn new(root: &Path) -> DataPaths {
        let data = root.join("data");
        DataPaths {
            generated_netlists: data.join("generated_netlists"),
            spec_csv: data.join("spec_csv"),
            graphs: data.join("graphs"),
        }
    }

    pub fn spec_table(&self) -> PathBuf {
        self.spec_csv.join("specs.csv")
    }

    pub fn dataset_file(&self) -> PathBuf {
        self.graphs.join("dataset.bin")
    }

    pub fn ranking_pairs_file(&self) -> PathBuf {
        self.graphs.join("ranking_pairs.bin")
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub output_root: PathBuf,
    /// Mutated variants per base circuit, on top of the original.
    pub num_variants: usize,
    pub seed: u64,
    /// Concurrent simulator processes. 0 lets rayon decide.
    pub num_threads: usize,
    pub simulator: SimulatorConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            output_root: PathBuf::from("."),
            num_variants: 20,
            seed: 0,
            num_threads: 0,
            simulator: SimulatorConfig::default(),
        }
    }
}

/// Self-supervision target: one device node whose features were
/// zeroed, and what they were.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskLabel {
    /// Node index of the masked device, -1 if the graph has none.
    pub device_node: i64,
    /// Index into [crate::netlist::DeviceKind::ALL], -1 if none.
    pub kind_label: i64,
    /// Raw `W`, 0.0 if absent.
    pub width: f64,
    /// Raw `L`, 0.0 if absent.
    pub length: f64,
}

impl MaskLabel {
    pub const NONE: MaskLabel = MaskLabel {
        device_node: -1, kind_label: -1, width: 0., length: 0.
    };
}

/// One labeled variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSample {
    pub variant_id: String,
    pub base_name: String,
    pub mutation_kind: Option<MutationKind>,
    /// The encoded graph, with the masked node already zeroed.
    pub graph: Graph,
    pub perf: PerformanceVector,
    pub quality_score: f64,
    pub mask: MaskLabel,
}

/// `better` outranks `worse`. Both index the sample list and belong
/// to the same base circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingPair {
    pub better: usize,
    pub worse: usize,
}

/// The persisted dataset, read back.
#[derive(Debug, Clone, Default)]
pub struct CircuitDataset {
    pub samples: Vec<ScoredSample>,
    pub ranking_pairs: Vec<RankingPair>,
}

impl CircuitDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ScoredSample> {
        self.samples.get(idx)
    }
}

/// Append-only CSV of measurements, one row per variant.
/// The header is written when the file is first created.
pub struct SpecTable {
    path: PathBuf,
}

impl SpecTable {
    pub fn new(path: PathBuf) -> SpecTable {
        SpecTable { path }
    }

    pub fn append(&self, variant_id: &str, perf: &PerformanceVector) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let write_header = !self.path.exists();
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if write_header {
            writeln!(f, "netlist_id,{}", MEASURE_KEYS.join(","))?;
        }
        writeln!(f, "{},{}", variant_id,
                 perf.to_array().iter().map(|v| format!("{:?}", v)).join(","))?;
        Ok(())
    }
}

/// Drives parsing, mutation, simulation and encoding over all base
/// circuits.
///
/// One ChaCha RNG seeded from the config is shared by every random
/// draw, in a fixed order: for each base circuit, all mutation draws,
/// then one mask draw per variant in variant order. Simulations run
/// concurrently in between and draw nothing.
pub struct DatasetAssembler {
    pub config: DatasetConfig,
    pub paths: DataPaths,
    simulator: Simulator,
    spec_table: SpecTable,
    rng: ChaCha20Rng,
    pool: rayon::ThreadPool,
}

impl DatasetAssembler {
    pub fn new(config: DatasetConfig) -> Result<DatasetAssembler> {
        let paths = DataPaths::new(&config.output_root);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()?;
        Ok(DatasetAssembler {
            simulator: Simulator::new(config.simulator.clone()),
            spec_table: SpecTable::new(paths.spec_table()),
            rng: ChaCha20Rng::seed_from_u64(config.seed),
            paths, pool, config,
        })
    }

    /// Build, persist and return the samples and ranking pairs for
    /// all base netlists. A base netlist that fails to parse aborts
    /// the run; simulator failures never do.
    pub fn run(
        &mut self, base_netlists: &[PathBuf]
    ) -> Result<(Vec<ScoredSample>, Vec<RankingPair>)> {
        let mut samples = Vec::new();
        let mut ranking_pairs = Vec::new();

        for base_path in base_netlists {
            let base_name = base_path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "netlist".to_string());
            let topology = Topology::parse_file(base_path)?;
            clilog::info!("base circuit {}: {} devices ({}), {} nets",
                          base_name, topology.num_devices(),
                          topology.kind_summary(), topology.nets().len());

            let family_start = samples.len();
            self.assemble_family(&base_name, &topology, &mut samples)?;
            let family = (family_start..samples.len()).collect::<Vec<_>>();
            let pairs = build_ranking_pairs(&family, &samples);
            clilog::info!("base circuit {}: {} samples, {} ranking pairs",
                          base_name, family.len(), pairs.len());
            ranking_pairs.extend(pairs);
        }

        self.persist(&samples, &ranking_pairs)?;
        let num_degraded = samples.iter().filter(|s| s.perf.is_zero()).count();
        clilog::info!("dataset: {} samples ({} with zero measurements), {} ranking pairs",
                      samples.len(), num_degraded, ranking_pairs.len());
        Ok((samples, ranking_pairs))
    }

    /// Generate, simulate and label every variant of one base circuit.
    fn assemble_family(
        &mut self, base_name: &str, topology: &Topology,
        samples: &mut Vec<ScoredSample>
    ) -> Result<()> {
        let variants = generate_variants(
            base_name, topology, self.config.num_variants, &mut self.rng
        );

        std::fs::create_dir_all(&self.paths.generated_netlists)?;
        for variant in &variants {
            let path = self.paths.generated_netlists
                .join(format!("{}.cir", variant.variant_id));
            std::fs::write(&path, variant.topology.to_netlist_text())?;
        }

        let timer_simulate = clilog::stimer!("simulate variants");
        let simulator = &self.simulator;
        let perfs = self.pool.install(|| {
            variants.par_iter()
                .map(|v| simulator.simulate(&v.topology, &v.variant_id))
                .collect::<Vec<_>>()
        });
        clilog::finish!(timer_simulate);

        for (variant, perf) in variants.into_iter().zip(perfs) {
            self.spec_table.append(&variant.variant_id, &perf)?;
            let sample = label_variant(base_name, variant, perf, &mut self.rng);
            samples.push(sample);
        }
        Ok(())
    }

    fn persist(&self, samples: &[ScoredSample], ranking_pairs: &[RankingPair]) -> Result<()> {
        std::fs::create_dir_all(&self.paths.graphs)?;
        write_bare(&self.paths.dataset_file(), &samples)?;
        write_bare(&self.paths.ranking_pairs_file(), &ranking_pairs)?;
        clilog::info!("dataset written to {}", self.paths.graphs.display());
        Ok(())
    }
}

/// Score, encode and mask one simulated variant.
fn label_variant(
    base_name: &str, variant: Variant, perf: PerformanceVector,
    rng: &mut impl Rng
) -> ScoredSample {
    let mut graph = graph::encode(&variant.topology);
    let mask = mask_random_device(&mut graph, &variant.topology, rng);
    ScoredSample {
        variant_id: variant.variant_id,
        base_name: base_name.to_string(),
        mutation_kind: variant.mutation_kind,
        graph,
        quality_score: quality_score(&perf),
        perf,
        mask,
    }
}

/// Pick one device node uniformly, zero its features and return its
/// true attributes. No draw is made when there is no device node.
pub fn mask_random_device(
    graph: &mut Graph, topology: &Topology, rng: &mut impl Rng
) -> MaskLabel {
    let device_nodes = graph.device_nodes();
    let Some(&node) = device_nodes.choose(rng) else {
        return MaskLabel::NONE
    };
    graph.zero_node(node);
    // device nodes follow the net nodes in topology order
    let device = &topology.devices()[node - graph.num_nets()];
    MaskLabel {
        device_node: node as i64,
        kind_label: device.kind.index() as i64,
        width: device.param("W").unwrap_or(0.),
        length: device.param("L").unwrap_or(0.),
    }
}

/// Quartile ranking pairs within one base circuit's family.
///
/// With `k = max(1, n / 4)`, every one of the top-k samples by score
/// is paired with every one of the bottom-k. A sample is never
/// paired with itself, which matters only when `n < 2k`.
pub fn build_ranking_pairs(family: &[usize], samples: &[ScoredSample]) -> Vec<RankingPair> {
    let mut ranked = family.to_vec();
    // stable: ties keep variant order
    ranked.sort_by(|&a, &b| {
        samples[b].quality_score.total_cmp(&samples[a].quality_score)
    });
    let k = (ranked.len() / 4).max(1).min(ranked.len());
    let good = &ranked[..k];
    let bad = &ranked[ranked.len() - k..];
    good.iter().cartesian_product(bad.iter())
        .filter(|(g, b)| g != b)
        .map(|(&better, &worse)| RankingPair { better, worse })
        .collect()
}

fn write_bare<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path)?;
    let mut buf = BufWriter::new(f);
    serde_bare::to_writer(&mut buf, value)
        .map_err(|e| Error::Persist(format!("{}: {}", path.display(), e)))?;
    buf.flush()?;
    Ok(())
}

fn read_bare<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let f = File::open(path)?;
    let mut buf = BufReader::new(f);
    serde_bare::from_reader(&mut buf)
        .map_err(|e| Error::Persist(format!("{}: {}", path.display(), e)))
}

/// Read back what [DatasetAssembler::run] persisted.
pub fn load_dataset(paths: &DataPaths) -> Result<CircuitDataset> {
    Ok(CircuitDataset {
        samples: read_bare(&paths.dataset_file())?,
        ranking_pairs: read_bare(&paths.ranking_pairs_file())?,
    })
}
