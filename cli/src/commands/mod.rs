// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the arrayvol CLI

pub mod config;
pub mod export;
pub mod node;
pub mod snapshot;
pub mod volume;

pub use self::config::ConfigCommand;
pub use self::export::ExportCommand;
pub use self::node::NodeCommand;
pub use self::snapshot::SnapshotCommand;
pub use self::volume::VolumeCommand;

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

use arrayvol_core::domain::volume::{GIB, KIB, MIB, TIB};

/// Parse a byte count with an optional binary suffix (`Ki`, `Mi`, `Gi`, `Ti`)
pub fn parse_capacity(input: &str) -> Result<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);
    if digits.is_empty() {
        bail!("capacity '{}' does not start with a number", input);
    }

    let multiplier = match suffix {
        "" => 1,
        "Ki" => KIB,
        "Mi" => MIB,
        "Gi" => GIB,
        "Ti" => TIB,
        other => bail!("unknown capacity suffix '{}' (use Ki, Mi, Gi or Ti)", other),
    };
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid capacity '{}'", input))?;
    value
        .checked_mul(multiplier)
        .with_context(|| format!("capacity '{}' overflows", input))
}

/// Parse a `key=value` argument
pub fn parse_key_value(input: &str) -> Result<(String, String)> {
    let (key, value) = input
        .split_once('=')
        .with_context(|| format!("expected key=value, got '{}'", input))?;
    if key.trim().is_empty() {
        bail!("empty key in '{}'", input);
    }
    Ok((key.trim().to_string(), value.to_string()))
}

pub fn collect_pairs(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}
