// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! SPICE numeric literals.

use crate::error::{Error, Result};

/// SI suffixes accepted after a mantissa.
///
/// `meg` must be tried before `g` and `m`, otherwise `1meg` would
/// be read as giga or milli.
const SI_SUFFIXES: [(&str, f64); 8] = [
    ("f", 1e-15),
    ("p", 1e-12),
    ("n", 1e-9),
    ("u", 1e-6),
    ("meg", 1e6),
    ("m", 1e-3),
    ("k", 1e3),
    ("g", 1e9),
];

/// Parse a SPICE literal such as `0.18u`, `10k` or `1meg`.
///
/// A suffix whose mantissa does not parse is not an error by itself;
/// the remaining suffixes and finally a plain float parse are tried.
pub fn parse_value(literal: &str) -> Result<f64> {
    let token = literal.trim().to_ascii_lowercase();
    for (suffix, scale) in SI_SUFFIXES {
        if let Some(mantissa) = token.strip_suffix(suffix) {
            if let Ok(v) = mantissa.parse::<f64>() {
                return Ok(v * scale)
            }
        }
    }
    token.parse::<f64>()
        .map_err(|_| Error::NumberFormat(literal.to_string()))
}

/// log10 clamped to 0.0 for non-positive inputs.
#[inline]
pub fn safe_log10(x: f64) -> f64 {
    if x <= 0. { 0. } else { x.log10() }
}
