// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Simulation session: owns all per-run state and exposes the single-step
//! entry point.
//!
//! A session wires one core model to its backing memory, bus emulator,
//! cycle driver, shadow state, and (optionally) waveform probe and
//! differential tester. The external driver calls
//! [`step_instruction`](Session::step_instruction) repeatedly; each call
//! cycles the model until one instruction retires, syncs the shadow state,
//! applies the termination rules, and runs the comparator. Once the run
//! state leaves [`RunState::Running`] it never returns, and further steps
//! are no-ops.

use crate::bus::BusEmu;
use crate::core::CoreModel;
use crate::cycle::CycleDriver;
use crate::difftest::{Difftest, Report};
use crate::mem::PhysMem;
use crate::profile::CoreProfile;
use crate::state::{ArchState, GPR_NAMES};
use crate::wave::WaveProbe;

/// Run status; transitions are monotonic out of `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Program ended via debug-break or the trap-detected signal. `code` is
    /// read from the profile's return-value register at the ending
    /// instruction.
    Ended { pc: u32, code: u32 },
    /// Harness stopped the run: the comparator saw the models diverge.
    Aborted { pc: u32 },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }

    /// Ended with a zero payload. A convention, not an architectural rule.
    pub fn is_good_end(&self) -> bool {
        matches!(self, RunState::Ended { code: 0, .. })
    }
}

pub struct Session<C: CoreModel> {
    profile: CoreProfile,
    core: C,
    bus: BusEmu,
    mem: PhysMem,
    driver: CycleDriver,
    shadow: ArchState,
    wave: Option<WaveProbe>,
    difftest: Option<Difftest>,
    image: Vec<u8>,
    run_state: RunState,
    instret: u64,
    pub itrace: bool,
    pub rtrace: bool,
}

impl<C: CoreModel> Session<C> {
    /// Build a session around `core`. The image is loaded into backing
    /// memory here; the core itself is untouched until [`start`](Self::start).
    pub fn new(core: C, profile: CoreProfile, image: Vec<u8>) -> Result<Self, String> {
        let mut mem = PhysMem::new(profile.mem_base, profile.mem_size);
        mem.load_image(&image)?;
        let driver = CycleDriver::new(&profile);
        let shadow = ArchState::at_reset(profile.reset_vector, profile.mstatus_reset);
        Ok(Self {
            profile,
            core,
            bus: BusEmu::new(),
            mem,
            driver,
            shadow,
            wave: None,
            difftest: None,
            image,
            run_state: RunState::Running,
            instret: 0,
            itrace: false,
            rtrace: false,
        })
    }

    pub fn attach_wave(&mut self, probe: WaveProbe) {
        self.wave = Some(probe);
    }

    /// Must be attached before [`start`](Self::start) so the reference gets
    /// seeded with the post-reset state.
    pub fn attach_difftest(&mut self, difftest: Difftest) {
        self.difftest = Some(difftest);
    }

    /// Reset the core and align every state holder on the reset vector.
    /// Call once, before the first step.
    pub fn start(&mut self) {
        self.driver
            .reset_sequence(&mut self.core, &mut self.bus, &mut self.mem, &mut self.wave);
        self.shadow = ArchState::at_reset(self.profile.reset_vector, self.profile.mstatus_reset);
        self.instret = 0;
        self.run_state = RunState::Running;
        if let Some(dt) = self.difftest.as_mut() {
            dt.seed(self.mem.base(), &self.image, &self.shadow.context());
        }
    }

    /// Execute one instruction: cycle until the core signals retirement (or
    /// a trap), sync the shadow state, apply the termination rules, then
    /// step the reference and compare when differential testing is enabled.
    /// Returns the resulting run state; terminal states make this a no-op.
    pub fn step_instruction(&mut self) -> RunState {
        if self.run_state.is_terminal() {
            return self.run_state;
        }
        loop {
            self.driver
                .advance_one_cycle(&mut self.core, &mut self.bus, &mut self.mem, &mut self.wave);
            if self.core.retired() || self.core.trap() {
                break;
            }
        }
        self.sync_and_check();
        self.run_state
    }

    fn sync_and_check(&mut self) {
        let prev_gpr = self.shadow.gpr;
        self.shadow.capture(&self.core, &self.mem);
        self.instret += 1;
        if self.itrace {
            clilog::info!(
                "[itrace] pc={:#010x} inst={:#010x} dnpc={:#010x}",
                self.shadow.pc,
                self.shadow.inst,
                self.shadow.dnpc
            );
        }
        if self.rtrace {
            // x0 never changes; start at 1
            for i in 1..32 {
                if self.shadow.gpr[i] != prev_gpr[i] {
                    clilog::info!(
                        "[rtrace] pc={:#010x} {} <- {:#010x}",
                        self.shadow.pc,
                        GPR_NAMES[i],
                        self.shadow.gpr[i]
                    );
                }
            }
        }

        // termination first: the reference must not replay the break
        if self.core.trap() || self.shadow.inst == self.profile.ebreak_inst {
            let pc = self.shadow.pc;
            let code = self.shadow.gpr[self.profile.ret_reg];
            if code == 0 {
                clilog::info!("HIT GOOD TRAP at pc = {:#010x}", pc);
            } else {
                clilog::error!("HIT BAD TRAP at pc = {:#010x}, exit code = {}", pc, code);
            }
            self.run_state = RunState::Ended { pc, code };
            return;
        }

        if let Some(dt) = self.difftest.as_mut() {
            let dut = self.shadow.context();
            let mismatches = dt.step(&dut);
            if !mismatches.is_empty() {
                for m in &mismatches {
                    clilog::error!(
                        "difftest: {} diverged, ref = {:#010x}, dut = {:#010x}",
                        m.field,
                        m.ref_val,
                        m.dut_val
                    );
                }
                clilog::error!(
                    "difftest: abort at pc = {:#010x} after {} instructions, postmortem:\n{}",
                    self.shadow.pc,
                    self.instret,
                    Report {
                        reference: dt.last_ref(),
                        dut: &dut,
                    }
                );
                self.run_state = RunState::Aborted {
                    pc: self.shadow.pc,
                };
            }
        }
    }

    /// Drop the waveform probe, flushing its buffered output. Needed before
    /// any `process::exit`, which skips destructors.
    pub fn close_wave(&mut self) {
        self.wave = None;
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn instret(&self) -> u64 {
        self.instret
    }

    pub fn cycles(&self) -> u64 {
        self.driver.cycles()
    }

    pub fn shadow(&self) -> &ArchState {
        &self.shadow
    }

    pub fn mem(&self) -> &PhysMem {
        &self.mem
    }

    pub fn bus(&self) -> &BusEmu {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BusEmu {
        &mut self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Channel;
    use crate::difftest::Difftest;
    use crate::scripted::{ScriptOp, ScriptedCore, ScriptedRef};
    use crate::state::CpuContext;

    const NOP: u32 = 0x0000_0013;
    const EBREAK: u32 = 0x0010_0073;

    fn image(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn session(script: Vec<ScriptOp>, img: Vec<u8>) -> Session<ScriptedCore> {
        let profile = CoreProfile::default();
        let core = ScriptedCore::new(script, &profile);
        let mut s = Session::new(core, profile, img).unwrap();
        s.bus_mut().record = true;
        s
    }

    #[test]
    fn reset_lands_the_shadow_on_the_reset_vector() {
        let mut s = session(vec![ScriptOp::Break], image(&[EBREAK]));
        s.start();
        assert_eq!(s.run_state(), RunState::Running);
        assert_eq!(s.shadow().pc, 0x2000_0000);
        assert_eq!(s.shadow().dnpc, 0x2000_0000);
        assert_eq!(s.instret(), 0);
        assert_eq!(s.cycles(), 10);
    }

    #[test]
    fn lone_break_ends_good_with_no_data_traffic() {
        let mut s = session(vec![ScriptOp::Break], image(&[EBREAK]));
        s.start();
        let st = s.step_instruction();
        assert_eq!(
            st,
            RunState::Ended {
                pc: 0x2000_0000,
                code: 0
            }
        );
        assert!(st.is_good_end());
        assert_eq!(s.instret(), 1);
        let data = s.bus().chan(Channel::Data);
        assert_eq!(data.reads + data.writes, 0);
        assert!(data.accesses.is_empty());
    }

    #[test]
    fn store_then_break_leaves_the_word_in_memory() {
        let addr = 0x2000_0100;
        let mut s = session(
            vec![
                ScriptOp::Store {
                    addr,
                    data: 0xDEAD_BEEF,
                    mask: 0b1111,
                },
                ScriptOp::Break,
            ],
            image(&[NOP, EBREAK]),
        );
        s.start();
        assert_eq!(s.step_instruction(), RunState::Running);
        assert!(s.step_instruction().is_terminal());
        assert_eq!(s.mem().read_word(addr), 0xDEAD_BEEF);
        let data = s.bus().chan(Channel::Data);
        assert_eq!(data.writes, 1);
        let writes: Vec<_> = data.accesses.iter().filter(|a| a.write).collect();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].addr, addr);
        assert_eq!(writes[0].data, 0xDEAD_BEEF);
        assert_eq!(writes[0].mask, 0b1111);
    }

    #[test]
    fn nonzero_payload_classifies_as_bad() {
        let mut s = session(
            vec![ScriptOp::RegWrite { rd: 10, value: 3 }, ScriptOp::Break],
            image(&[NOP, EBREAK]),
        );
        s.start();
        s.step_instruction();
        let st = s.step_instruction();
        assert_eq!(
            st,
            RunState::Ended {
                pc: 0x2000_0004,
                code: 3
            }
        );
        assert!(!st.is_good_end());
    }

    #[test]
    fn payload_register_follows_the_profile() {
        let mut profile = CoreProfile::default();
        profile.ret_reg = 11;
        let core = ScriptedCore::new(
            vec![ScriptOp::RegWrite { rd: 11, value: 7 }, ScriptOp::Break],
            &profile,
        );
        let mut s = Session::new(core, profile, image(&[NOP, EBREAK])).unwrap();
        s.start();
        s.step_instruction();
        assert_eq!(
            s.step_instruction(),
            RunState::Ended {
                pc: 0x2000_0004,
                code: 7
            }
        );
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut s = session(vec![ScriptOp::Break], image(&[EBREAK]));
        s.start();
        let end = s.step_instruction();
        assert!(end.is_terminal());
        let cycles = s.cycles();
        // repeated stepping (and the still-asserted trap signal) must not
        // re-enter or re-transition
        assert_eq!(s.step_instruction(), end);
        assert_eq!(s.step_instruction(), end);
        assert_eq!(s.instret(), 1);
        assert_eq!(s.cycles(), cycles);
    }

    #[test]
    fn divergence_aborts_on_the_first_observable_instruction() {
        // reference expects 7 in x5; the scripted "hardware" writes 99
        let mut good = CpuContext::default();
        good.pc = 0x2000_0004;
        good.gpr[5] = 7;
        good.csr.mstatus = 0x1800;

        let mut s = session(
            vec![ScriptOp::RegWrite { rd: 5, value: 99 }, ScriptOp::Break],
            image(&[NOP, EBREAK]),
        );
        s.attach_difftest(Difftest::new(Box::new(ScriptedRef::new(vec![good]))));
        s.start();
        let st = s.step_instruction();
        assert_eq!(st, RunState::Aborted { pc: 0x2000_0000 });
        assert_eq!(s.instret(), 1);
        // sticky like every terminal state
        assert_eq!(s.step_instruction(), st);
    }

    #[test]
    fn matching_reference_runs_clean_to_the_end() {
        let mut after1 = CpuContext::default();
        after1.pc = 0x2000_0004;
        after1.gpr[5] = 7;
        after1.csr.mstatus = 0x1800;

        let mut s = session(
            vec![ScriptOp::RegWrite { rd: 5, value: 7 }, ScriptOp::Break],
            image(&[NOP, EBREAK]),
        );
        s.attach_difftest(Difftest::new(Box::new(ScriptedRef::new(vec![after1]))));
        s.start();
        assert_eq!(s.step_instruction(), RunState::Running);
        assert!(matches!(s.step_instruction(), RunState::Ended { code: 0, .. }));
    }
}
