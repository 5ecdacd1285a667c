// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Cycle driver: clocking discipline, reset sequencing, time base.
//!
//! One cycle is two phases. Each phase drives the clock to its level,
//! settles the model, optionally lets the bus emulator service requests
//! (only on the configured sampling phase), feeds the waveform probe, and
//! advances the time counter by one. Which phase comes first and which one
//! the bus samples are per-core-variant properties taken from the profile.

use crate::bus::BusEmu;
use crate::core::{Channel, CoreModel};
use crate::mem::PhysMem;
use crate::profile::{ClockPhase, CoreProfile};
use crate::wave::{ChanSample, WaveProbe, WaveSample};

pub struct CycleDriver {
    time: u64,
    reset_cycles: usize,
    first_phase: ClockPhase,
    sample_phase: ClockPhase,
}

impl CycleDriver {
    pub fn new(profile: &CoreProfile) -> Self {
        Self {
            time: 0,
            reset_cycles: profile.reset_cycles,
            first_phase: profile.first_phase,
            sample_phase: profile.sample_phase,
        }
    }

    /// Phases driven so far (two per cycle).
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn cycles(&self) -> u64 {
        self.time / 2
    }

    /// Hold reset for the configured number of cycles while clocking, then
    /// release it and settle once more. The bus emulator stays idle for the
    /// whole sequence so half-reset request lines never reach memory.
    pub fn reset_sequence<C: CoreModel>(
        &mut self,
        core: &mut C,
        bus: &mut BusEmu,
        mem: &mut PhysMem,
        wave: &mut Option<WaveProbe>,
    ) {
        core.set_reset(true);
        core.set_clock(false);
        core.eval();
        bus.reset(core);
        for _ in 0..self.reset_cycles {
            self.phase(self.first_phase, core, bus, mem, wave, true);
            self.phase(self.first_phase.other(), core, bus, mem, wave, true);
        }
        core.set_reset(false);
        core.eval();
    }

    /// Advance exactly one clock period.
    pub fn advance_one_cycle<C: CoreModel>(
        &mut self,
        core: &mut C,
        bus: &mut BusEmu,
        mem: &mut PhysMem,
        wave: &mut Option<WaveProbe>,
    ) {
        self.phase(self.first_phase, core, bus, mem, wave, false);
        self.phase(self.first_phase.other(), core, bus, mem, wave, false);
    }

    fn phase<C: CoreModel>(
        &mut self,
        ph: ClockPhase,
        core: &mut C,
        bus: &mut BusEmu,
        mem: &mut PhysMem,
        wave: &mut Option<WaveProbe>,
        in_reset: bool,
    ) {
        core.set_clock(ph.level());
        core.eval();
        if !in_reset && ph == self.sample_phase {
            bus.service(core, mem);
        }
        if let Some(probe) = wave.as_mut() {
            let snap = |ch: Channel| {
                let (req_valid, req_addr) = match core.bus_request(ch) {
                    Some(req) => (true, req.addr),
                    None => (false, 0),
                };
                let st = bus.chan(ch);
                ChanSample {
                    req_valid,
                    req_addr,
                    resp_valid: st.pending(),
                    resp_data: st.resp_data(),
                    resp_ready: core.resp_ready(ch),
                }
            };
            let sample = WaveSample {
                clock: ph.level(),
                reset: in_reset,
                retired: core.retired(),
                pc: core.debug_pc(),
                chan: [snap(Channel::Ifetch), snap(Channel::Data)],
            };
            probe.sample(self.time, &sample);
        }
        self.time += 1;
    }
}
