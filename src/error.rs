// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Error types surfaced by the dataset pipeline.
//!
//! Only netlist parsing and artifact persistence can fail.
//! Simulator trouble never reaches this type; see [crate::ngspice].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A device line that cannot be split into the expected tokens.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        message: String,
    },

    /// A numeric literal with no known SI suffix that is not a plain
    /// float either.
    #[error("cannot parse numeric literal `{0}`")]
    NumberFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// serde_bare encode/decode failure on a dataset artifact.
    #[error("dataset persistence error: {0}")]
    Persist(String),

    #[error("cannot start simulation workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
