// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Generate a scored, graph-encoded amplifier dataset from one or
//! more base netlists.

use std::path::PathBuf;
use std::time::Duration;
use ampgraph::dataset::{DatasetAssembler, DatasetConfig};
use ampgraph::ngspice::SimulatorConfig;

#[derive(clap::Parser, Debug)]
struct GenDatasetArgs {
    /// Base amplifier netlists (SPICE).
    #[clap(required = true)]
    base_netlists: Vec<PathBuf>,
    /// Directory under which `data/` is created.
    #[clap(long, default_value = ".")]
    output_root: PathBuf,
    /// Mutated variants per base netlist.
    #[clap(long, default_value_t = 20)]
    num_variants: usize,
    /// Seed for mutation and masking.
    #[clap(long, default_value_t = 0)]
    seed: u64,
    /// Concurrent simulations. 0 means one per core.
    #[clap(long, default_value_t = 0)]
    threads: usize,
    /// ngspice executable.
    #[clap(long, default_value = "ngspice")]
    ngspice: String,
    /// Per-simulation timeout.
    #[clap(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn main() {
    clilog::init_stderr_color_debug();
    clilog::set_max_print_count(clilog::Level::Warn, "SIM_NOT_FOUND", 1);
    clilog::set_max_print_count(clilog::Level::Warn, "SIM_FAILED", 5);
    let args = <GenDatasetArgs as clap::Parser>::parse();
    clilog::info!("gen_dataset args:\n{:#?}", args);

    let config = DatasetConfig {
        output_root: args.output_root,
        num_variants: args.num_variants,
        seed: args.seed,
        num_threads: args.threads,
        simulator: SimulatorConfig {
            executable: args.ngspice,
            timeout: Duration::from_secs(args.timeout_secs),
        },
    };

    let timer_all = clilog::stimer!("generate dataset");
    let result = DatasetAssembler::new(config)
        .and_then(|mut assembler| assembler.run(&args.base_netlists));
    clilog::finish!(timer_all);

    if let Err(e) = result {
        clilog::error!("dataset generation failed: {}", e);
        std::process::exit(1);
    }
}
