// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Shadow architectural state of the core under test.
//!
//! One [`ArchState`] instance lives per simulation run. The state-sync
//! bridge refreshes it after every retired instruction from the model's
//! debug signals; everything downstream (trace logs, run-state reporting,
//! the differential tester) reads from here instead of poking at hardware
//! signals directly.

use crate::core::CoreModel;
use crate::mem::PhysMem;

/// ABI names of the 32 general registers, indexed architecturally.
pub const GPR_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// Machine-mode CSRs tracked by the harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsrSet {
    pub mcause: u32,
    pub mepc: u32,
    pub mstatus: u32,
    pub mtvec: u32,
}

/// Host-side mirror of the core's architectural state.
///
/// `pc` is the address of the most recently retired instruction and `dnpc`
/// the resolved next PC; right after reset both hold the reset vector.
/// `inst` is the retired instruction word as re-fetched from backing memory.
#[derive(Debug, Clone)]
pub struct ArchState {
    pub pc: u32,
    pub dnpc: u32,
    pub inst: u32,
    pub gpr: [u32; 32],
    pub csr: CsrSet,
}

impl ArchState {
    /// Post-reset state: both PCs at the reset vector, registers cleared,
    /// status register at its architectural reset value.
    pub fn at_reset(reset_vector: u32, mstatus_reset: u32) -> Self {
        Self {
            pc: reset_vector,
            dnpc: reset_vector,
            inst: 0,
            gpr: [0; 32],
            csr: CsrSet {
                mstatus: mstatus_reset,
                ..CsrSet::default()
            },
        }
    }

    /// State-sync bridge: capture the architectural state exposed by the
    /// model's debug signals after a retirement. The instruction word is
    /// pulled from backing memory at the committed PC, not from the model's
    /// own fetch latch, so it matches what the reference model will replay.
    pub fn capture<C: CoreModel>(&mut self, core: &C, mem: &PhysMem) {
        self.pc = core.debug_pc();
        self.dnpc = core.debug_dnpc();
        for i in 0..32 {
            self.gpr[i] = core.debug_gpr(i);
        }
        self.csr = core.debug_csrs();
        self.inst = mem.read_word(self.pc);
    }

    /// Snapshot in the reference-model exchange layout. Taken after a
    /// retirement the architectural PC is the resolved next PC, which is
    /// what the reference holds after its own step.
    pub fn context(&self) -> CpuContext {
        CpuContext {
            gpr: self.gpr,
            pc: self.dnpc,
            csr: CsrBlock {
                mtvec: self.csr.mtvec,
                mepc: self.csr.mepc,
                mstatus: self.csr.mstatus,
                mcause: self.csr.mcause,
            },
        }
    }
}

// ── Reference-model exchange layout ─────────────────────────────────────────

/// CSR block in the exchange layout. Field order differs from the debug-port
/// order and must stay as-is.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsrBlock {
    pub mtvec: u32,
    pub mepc: u32,
    pub mstatus: u32,
    pub mcause: u32,
}

/// Architectural state as exchanged with reference models over `regcpy`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuContext {
    pub gpr: [u32; 32],
    pub pc: u32,
    pub csr: CsrBlock,
}

impl Default for CpuContext {
    fn default() -> Self {
        Self {
            gpr: [0; 32],
            pc: 0,
            csr: CsrBlock::default(),
        }
    }
}

impl CpuContext {
    pub fn csr_set(&self) -> CsrSet {
        CsrSet {
            mcause: self.csr.mcause,
            mepc: self.csr.mepc,
            mstatus: self.csr.mstatus,
            mtvec: self.csr.mtvec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_state_points_at_reset_vector() {
        let s = ArchState::at_reset(0x2000_0000, 0x1800);
        assert_eq!(s.pc, 0x2000_0000);
        assert_eq!(s.dnpc, 0x2000_0000);
        assert_eq!(s.gpr, [0; 32]);
        assert_eq!(s.csr.mstatus, 0x1800);
        assert_eq!(s.csr.mcause, 0);
    }

    #[test]
    fn context_pc_is_next_pc() {
        let mut s = ArchState::at_reset(0x2000_0000, 0x1800);
        s.pc = 0x2000_0010;
        s.dnpc = 0x2000_0014;
        s.gpr[10] = 42;
        s.csr.mtvec = 0x2000_0100;
        let ctx = s.context();
        assert_eq!(ctx.pc, 0x2000_0014);
        assert_eq!(ctx.gpr[10], 42);
        assert_eq!(ctx.csr.mtvec, 0x2000_0100);
        assert_eq!(ctx.csr.mstatus, 0x1800);
    }

    #[test]
    fn exchange_layout_is_packed_words() {
        // 32 GPRs + pc + 4 CSRs, u32 each, no padding.
        assert_eq!(std::mem::size_of::<CpuContext>(), 37 * 4);
        assert_eq!(std::mem::align_of::<CpuContext>(), 4);
    }

    #[test]
    fn gpr_names_follow_abi_order() {
        assert_eq!(GPR_NAMES.len(), 32);
        assert_eq!(GPR_NAMES[0], "zero");
        assert_eq!(GPR_NAMES[2], "sp");
        assert_eq!(GPR_NAMES[10], "a0");
        assert_eq!(GPR_NAMES[17], "a7");
        assert_eq!(GPR_NAMES[31], "t6");
    }
}
