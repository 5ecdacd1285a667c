// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Per-core-variant harness configuration, loaded from JSON.
//!
//! Everything that historically varied between core revisions lives here
//! instead of being hardcoded: the serviced memory window, the reset vector
//! and reset length, clock phase ordering and the bus sampling phase, the
//! debug-break encoding, and the exit-payload register convention.

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A clock phase, i.e. the level the clock line holds during it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockPhase {
    Low,
    High,
}

impl ClockPhase {
    pub fn level(self) -> bool {
        matches!(self, ClockPhase::High)
    }

    pub fn other(self) -> ClockPhase {
        match self {
            ClockPhase::Low => ClockPhase::High,
            ClockPhase::High => ClockPhase::Low,
        }
    }
}

/// Harness configuration for one core variant.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreProfile {
    /// Base address of the serviced memory window (boot image lands here).
    #[serde(default = "default_mem_base")]
    pub mem_base: u32,
    /// Size of the serviced window in bytes.
    #[serde(default = "default_mem_size")]
    pub mem_size: usize,
    /// Architecturally defined reset vector.
    #[serde(default = "default_reset_vector")]
    pub reset_vector: u32,
    /// Cycles to hold reset asserted before the settle evaluation.
    #[serde(default = "default_reset_cycles")]
    pub reset_cycles: usize,
    /// Instruction encoding that ends the run when it retires.
    #[serde(default = "default_ebreak_inst")]
    pub ebreak_inst: u32,
    /// Register index holding the program's exit payload, by convention.
    #[serde(default = "default_ret_reg")]
    pub ret_reg: usize,
    /// Status-register value both models start from.
    #[serde(default = "default_mstatus_reset")]
    pub mstatus_reset: u32,
    /// Phase driven first within each cycle.
    #[serde(default = "default_first_phase")]
    pub first_phase: ClockPhase,
    /// Phase on which the bus emulator samples and services requests.
    #[serde(default = "default_sample_phase")]
    pub sample_phase: ClockPhase,
}

fn default_mem_base() -> u32 {
    0x2000_0000
}

fn default_mem_size() -> usize {
    4096
}

fn default_reset_vector() -> u32 {
    0x2000_0000
}

fn default_reset_cycles() -> usize {
    10
}

fn default_ebreak_inst() -> u32 {
    0x0010_0073
}

fn default_ret_reg() -> usize {
    10
}

fn default_mstatus_reset() -> u32 {
    0x1800
}

fn default_first_phase() -> ClockPhase {
    ClockPhase::High
}

fn default_sample_phase() -> ClockPhase {
    ClockPhase::Low
}

impl Default for CoreProfile {
    fn default() -> Self {
        Self {
            mem_base: default_mem_base(),
            mem_size: default_mem_size(),
            reset_vector: default_reset_vector(),
            reset_cycles: default_reset_cycles(),
            ebreak_inst: default_ebreak_inst(),
            ret_reg: default_ret_reg(),
            mstatus_reset: default_mstatus_reset(),
            first_phase: default_first_phase(),
            sample_phase: default_sample_phase(),
        }
    }
}

impl CoreProfile {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
        let profile: CoreProfile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| format!("cannot parse {}: {}", path.display(), e))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ret_reg >= 32 {
            return Err(format!("ret_reg {} out of range (0..32)", self.ret_reg));
        }
        if self.mem_size == 0 || self.mem_size % 4 != 0 {
            return Err(format!(
                "mem_size {} must be a non-zero multiple of 4",
                self.mem_size
            ));
        }
        let span = self.mem_size as u64;
        let rv = self.reset_vector as u64;
        let base = self.mem_base as u64;
        if rv < base || rv >= base + span {
            return Err(format!(
                "reset_vector {:#010x} outside serviced window {:#010x}+{}",
                self.reset_vector, self.mem_base, self.mem_size
            ));
        }
        Ok(())
    }
}
