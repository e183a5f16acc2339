// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
pub mod error;

pub mod units;

pub mod netlist;

pub mod mutate;

pub mod ngspice;

pub mod graph;

pub mod score;

pub mod dataset;

pub use error::{Error, Result};
