// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! In-process stand-ins for the two externally supplied units.
//!
//! [`ScriptedCore`] is a clocked model that walks a fixed list of abstract
//! operations, performing real two-phase handshakes on the instruction and
//! data channels for each one. It behaves like a small non-pipelined core:
//! request-valid is held until response-valid is observed at a rising edge,
//! response-ready is asserted the cycle after, and a one-cycle retirement
//! strobe exposes the committed state on the debug signals. [`ScriptedRef`]
//! replays a precomputed sequence of architectural contexts through the
//! reference-model interface. Together they exercise every harness path
//! without a synthesized core or reference object.

use crate::core::{BusRequest, BusWrite, Channel, CoreModel};
use crate::difftest::{Direction, RefModel};
use crate::profile::CoreProfile;
use crate::state::{CpuContext, CsrSet};

/// One scripted instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOp {
    Nop,
    RegWrite { rd: usize, value: u32 },
    Load { addr: u32, rd: usize },
    Store { addr: u32, data: u32, mask: u8 },
    Jump { to: u32 },
    /// Retires like a no-op and raises the trap-detected signal.
    Break,
}

impl ScriptOp {
    fn data_access(self) -> bool {
        matches!(self, ScriptOp::Load { .. } | ScriptOp::Store { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FetchReq,
    FetchAck,
    DataReq,
    DataAck,
    Commit,
    /// Script exhausted; no further requests, no further retirements.
    Drained,
}

/// Input pins as last driven by the harness.
#[derive(Default)]
struct Pins {
    clock: bool,
    reset: bool,
    resp_valid: [bool; 2],
    resp_data: [u32; 2],
}

pub struct ScriptedCore {
    script: Vec<ScriptOp>,
    reset_vector: u32,
    mstatus_reset: u32,

    pins: Pins,
    prev_clock: bool,

    stage: Stage,
    idx: usize,
    pc: u32,
    dnpc: u32,
    gpr: [u32; 32],
    csr: CsrSet,
    load_latch: u32,
    retired_now: bool,
    trap_now: bool,
}

impl ScriptedCore {
    pub fn new(script: Vec<ScriptOp>, profile: &CoreProfile) -> Self {
        let csr = CsrSet {
            mstatus: profile.mstatus_reset,
            ..CsrSet::default()
        };
        Self {
            script,
            reset_vector: profile.reset_vector,
            mstatus_reset: profile.mstatus_reset,
            pins: Pins::default(),
            prev_clock: false,
            stage: Stage::FetchReq,
            idx: 0,
            pc: profile.reset_vector,
            dnpc: profile.reset_vector,
            gpr: [0; 32],
            csr,
            load_latch: 0,
            retired_now: false,
            trap_now: false,
        }
    }

    fn write_gpr(&mut self, rd: usize, value: u32) {
        if rd != 0 {
            self.gpr[rd] = value;
        }
    }

    /// Apply the current op's architectural effect; runs at the edge that
    /// enters [`Stage::Commit`].
    fn commit(&mut self) {
        let op = self.script[self.idx];
        self.dnpc = self.pc.wrapping_add(4);
        match op {
            ScriptOp::Nop | ScriptOp::Break | ScriptOp::Store { .. } => {}
            ScriptOp::RegWrite { rd, value } => self.write_gpr(rd, value),
            ScriptOp::Load { rd, .. } => self.write_gpr(rd, self.load_latch),
            ScriptOp::Jump { to } => self.dnpc = to,
        }
        self.trap_now = matches!(op, ScriptOp::Break);
        self.retired_now = true;
        self.stage = Stage::Commit;
    }

    fn on_posedge(&mut self) {
        if self.pins.reset {
            self.stage = Stage::FetchReq;
            self.idx = 0;
            self.pc = self.reset_vector;
            self.dnpc = self.reset_vector;
            self.gpr = [0; 32];
            self.csr = CsrSet {
                mstatus: self.mstatus_reset,
                ..CsrSet::default()
            };
            self.retired_now = false;
            self.trap_now = false;
            return;
        }
        match self.stage {
            Stage::FetchReq => {
                if self.pins.resp_valid[Channel::Ifetch as usize] {
                    self.stage = Stage::FetchAck;
                }
            }
            Stage::FetchAck => {
                if self.script[self.idx].data_access() {
                    self.stage = Stage::DataReq;
                } else {
                    self.commit();
                }
            }
            Stage::DataReq => {
                if self.pins.resp_valid[Channel::Data as usize] {
                    self.load_latch = self.pins.resp_data[Channel::Data as usize];
                    self.stage = Stage::DataAck;
                }
            }
            Stage::DataAck => self.commit(),
            Stage::Commit => {
                self.pc = self.dnpc;
                self.idx += 1;
                self.retired_now = false;
                self.trap_now = false;
                self.stage = if self.idx < self.script.len() {
                    Stage::FetchReq
                } else {
                    Stage::Drained
                };
            }
            Stage::Drained => {}
        }
    }
}

impl CoreModel for ScriptedCore {
    fn set_clock(&mut self, level: bool) {
        self.pins.clock = level;
    }

    fn set_reset(&mut self, active: bool) {
        self.pins.reset = active;
    }

    fn eval(&mut self) {
        if self.pins.clock && !self.prev_clock {
            self.on_posedge();
        }
        self.prev_clock = self.pins.clock;
    }

    fn retired(&self) -> bool {
        self.retired_now
    }

    fn trap(&self) -> bool {
        self.trap_now
    }

    fn debug_pc(&self) -> u32 {
        self.pc
    }

    fn debug_dnpc(&self) -> u32 {
        self.dnpc
    }

    fn debug_gpr(&self, idx: usize) -> u32 {
        self.gpr[idx]
    }

    fn debug_csrs(&self) -> CsrSet {
        self.csr
    }

    fn bus_request(&self, ch: Channel) -> Option<BusRequest> {
        match (ch, self.stage) {
            (Channel::Ifetch, Stage::FetchReq) => Some(BusRequest {
                addr: self.pc,
                write: None,
            }),
            (Channel::Data, Stage::DataReq) => match self.script[self.idx] {
                ScriptOp::Load { addr, .. } => Some(BusRequest { addr, write: None }),
                ScriptOp::Store { addr, data, mask } => Some(BusRequest {
                    addr,
                    write: Some(BusWrite { data, mask }),
                }),
                _ => None,
            },
            _ => None,
        }
    }

    fn resp_ready(&self, ch: Channel) -> bool {
        matches!(
            (ch, self.stage),
            (Channel::Ifetch, Stage::FetchAck) | (Channel::Data, Stage::DataAck)
        )
    }

    fn drive_resp(&mut self, ch: Channel, resp: Option<u32>) {
        self.pins.resp_valid[ch as usize] = resp.is_some();
        self.pins.resp_data[ch as usize] = resp.unwrap_or(0);
    }
}

/// Reference model replaying a fixed timeline of contexts; `timeline[i]` is
/// the architectural state after `i + 1` executed instructions.
pub struct ScriptedRef {
    timeline: Vec<CpuContext>,
    executed: usize,
    pub seeded_ctx: Option<CpuContext>,
    pub seeded_mem: Vec<(u32, Vec<u8>)>,
}

impl ScriptedRef {
    pub fn new(timeline: Vec<CpuContext>) -> Self {
        Self {
            timeline,
            executed: 0,
            seeded_ctx: None,
            seeded_mem: Vec::new(),
        }
    }

    fn current(&self) -> CpuContext {
        if self.executed == 0 || self.timeline.is_empty() {
            return self.seeded_ctx.unwrap_or_default();
        }
        let i = (self.executed - 1).min(self.timeline.len() - 1);
        self.timeline[i]
    }
}

impl RefModel for ScriptedRef {
    fn memcpy(&mut self, addr: u32, buf: &mut [u8], dir: Direction) {
        if dir == Direction::ToRef {
            self.seeded_mem.push((addr, buf.to_vec()));
        }
    }

    fn regcpy(&mut self, ctx: &mut CpuContext, dir: Direction) {
        match dir {
            Direction::ToRef => self.seeded_ctx = Some(*ctx),
            Direction::ToDut => *ctx = self.current(),
        }
    }

    fn exec(&mut self, n: u64) {
        self.executed += n as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEmu;
    use crate::cycle::CycleDriver;
    use crate::mem::PhysMem;

    fn rig(script: Vec<ScriptOp>) -> (CoreProfile, ScriptedCore, BusEmu, PhysMem, CycleDriver) {
        let profile = CoreProfile::default();
        let core = ScriptedCore::new(script, &profile);
        let bus = BusEmu::new();
        let mem = PhysMem::new(profile.mem_base, profile.mem_size);
        let driver = CycleDriver::new(&profile);
        (profile, core, bus, mem, driver)
    }

    fn run_until_retired(
        core: &mut ScriptedCore,
        bus: &mut BusEmu,
        mem: &mut PhysMem,
        driver: &mut CycleDriver,
    ) {
        for _ in 0..100 {
            driver.advance_one_cycle(core, bus, mem, &mut None);
            if core.retired() {
                return;
            }
        }
        panic!("no retirement within 100 cycles");
    }

    #[test]
    fn fetch_handshake_reaches_commit() {
        let (profile, mut core, mut bus, mut mem, mut driver) = rig(vec![ScriptOp::Nop]);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(core.debug_pc(), profile.reset_vector);
        assert_eq!(core.debug_dnpc(), profile.reset_vector + 4);
        assert_eq!(bus.chan(Channel::Ifetch).reads, 1);
        assert_eq!(bus.chan(Channel::Ifetch).violations, 0);
        assert_eq!(bus.chan(Channel::Data).reads + bus.chan(Channel::Data).writes, 0);
    }

    #[test]
    fn store_commits_through_the_data_channel() {
        let addr = 0x2000_0100;
        let (_, mut core, mut bus, mut mem, mut driver) = rig(vec![ScriptOp::Store {
            addr,
            data: 0xDEAD_BEEF,
            mask: 0b1111,
        }]);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(mem.read_word(addr), 0xDEAD_BEEF);
        assert_eq!(bus.chan(Channel::Data).writes, 1);
        assert_eq!(bus.chan(Channel::Data).violations, 0);
    }

    #[test]
    fn load_lands_in_the_named_register() {
        let addr = 0x2000_0200;
        let (_, mut core, mut bus, mut mem, mut driver) =
            rig(vec![ScriptOp::Load { addr, rd: 7 }]);
        mem.write_bytes(addr, 0x55AA_1234, 0b1111);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(core.debug_gpr(7), 0x55AA_1234);
        assert_eq!(bus.chan(Channel::Data).reads, 1);
    }

    #[test]
    fn jump_resolves_the_next_pc() {
        let (profile, mut core, mut bus, mut mem, mut driver) =
            rig(vec![ScriptOp::Jump { to: 0x2000_0800 }]);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(core.debug_pc(), profile.reset_vector);
        assert_eq!(core.debug_dnpc(), 0x2000_0800);
    }

    #[test]
    fn writes_to_x0_are_dropped() {
        let (_, mut core, mut bus, mut mem, mut driver) =
            rig(vec![ScriptOp::RegWrite { rd: 0, value: 5 }]);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(core.debug_gpr(0), 0);
    }

    #[test]
    fn break_raises_the_trap_signal_at_commit() {
        let (_, mut core, mut bus, mut mem, mut driver) = rig(vec![ScriptOp::Break]);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        assert!(!core.trap());
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert!(core.trap());
    }

    #[test]
    fn reset_restarts_the_script() {
        let (profile, mut core, mut bus, mut mem, mut driver) =
            rig(vec![ScriptOp::RegWrite { rd: 5, value: 9 }, ScriptOp::Nop]);
        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(core.debug_gpr(5), 9);

        driver.reset_sequence(&mut core, &mut bus, &mut mem, &mut None);
        assert_eq!(core.debug_pc(), profile.reset_vector);
        assert_eq!(core.debug_gpr(5), 0);
        // script index rewound: the first retirement performs op 0 again
        run_until_retired(&mut core, &mut bus, &mut mem, &mut driver);
        assert_eq!(core.debug_pc(), profile.reset_vector);
        assert_eq!(core.debug_gpr(5), 9);
    }

    #[test]
    fn scripted_ref_replays_its_timeline() {
        let mut a = CpuContext::default();
        a.pc = 0x2000_0004;
        a.gpr[5] = 7;
        let mut b = a;
        b.pc = 0x2000_0008;
        let mut r = ScriptedRef::new(vec![a, b]);

        let mut seed = CpuContext::default();
        seed.pc = 0x2000_0000;
        r.regcpy(&mut seed, Direction::ToRef);
        let mut img = vec![1u8, 2, 3, 4];
        r.memcpy(0x2000_0000, &mut img, Direction::ToRef);
        assert_eq!(r.seeded_ctx.unwrap().pc, 0x2000_0000);
        assert_eq!(r.seeded_mem, vec![(0x2000_0000, vec![1, 2, 3, 4])]);

        // before any exec the seeded context is echoed back
        let mut out = CpuContext::default();
        r.regcpy(&mut out, Direction::ToDut);
        assert_eq!(out.pc, 0x2000_0000);

        r.exec(1);
        r.regcpy(&mut out, Direction::ToDut);
        assert_eq!(out, a);
        r.exec(1);
        r.regcpy(&mut out, Direction::ToDut);
        assert_eq!(out, b);
    }
}
