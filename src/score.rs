// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Scalar quality score of a measured amplifier.

use crate::ngspice::PerformanceVector;

pub const TARGET_A0_DB: f64 = 60.;
pub const TARGET_UGBW_HZ: f64 = 1e6;
pub const TARGET_PM_DEG: f64 = 45.;
pub const TARGET_ID_A: f64 = 2e-3;

pub const WEIGHT_A0: f64 = 1.;
pub const WEIGHT_UGBW: f64 = 0.001;
pub const WEIGHT_PM: f64 = 0.1;
/// Current overshoot dominates everything else.
pub const WEIGHT_ID: f64 = 1000.;

/// Bonus for gain, bandwidth and phase margin above target, minus a
/// penalty for supply current above target. Below-target performance
/// earns nothing, it is not penalized.
pub fn quality_score(perf: &PerformanceVector) -> f64 {
    WEIGHT_A0 * (perf.a0_db - TARGET_A0_DB).max(0.)
        + WEIGHT_UGBW * (perf.ugbw_hz - TARGET_UGBW_HZ).max(0.)
        + WEIGHT_PM * (perf.pm_deg - TARGET_PM_DEG).max(0.)
        - WEIGHT_ID * (perf.id_a - TARGET_ID_A).max(0.)
}
