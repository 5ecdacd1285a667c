// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! VCD waveform sink.
//!
//! Write-only from the harness's point of view: the cycle driver hands over
//! one [`WaveSample`] per clock phase and this module turns it into VCD
//! change records, suppressing signals that did not move. The wire set is
//! fixed: clock, reset, retirement strobe, PC, and the request/response
//! lines of both bus channels.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use vcd_ng::{IdCode, SimulationCommand, TimescaleUnit, Value, VecValue};

type W = vcd_ng::Writer<BufWriter<File>>;

/// Signal snapshot for one clock phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveSample {
    pub clock: bool,
    pub reset: bool,
    pub retired: bool,
    pub pc: u32,
    pub chan: [ChanSample; 2],
}

/// Per-channel slice of a [`WaveSample`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChanSample {
    pub req_valid: bool,
    pub req_addr: u32,
    pub resp_valid: bool,
    pub resp_data: u32,
    pub resp_ready: bool,
}

// last = 2 means "not yet dumped"
struct Scalar {
    id: IdCode,
    last: u8,
}

impl Scalar {
    fn new(id: IdCode) -> Self {
        Self { id, last: 2 }
    }

    fn put(&mut self, w: &mut W, v: bool) {
        if self.last == v as u8 {
            return;
        }
        self.last = v as u8;
        w.change_scalar(self.id, if v { Value::V1 } else { Value::V0 })
            .unwrap();
    }
}

struct Vector {
    id: IdCode,
    last: Option<u32>,
}

impl Vector {
    fn new(id: IdCode) -> Self {
        Self { id, last: None }
    }

    fn put(&mut self, w: &mut W, v: u32) {
        if self.last == Some(v) {
            return;
        }
        self.last = Some(v);
        let mut bits = [Value::V0; 32];
        for (i, b) in bits.iter_mut().enumerate() {
            if v >> (31 - i) & 1 != 0 {
                *b = Value::V1;
            }
        }
        w.change_vector(self.id, &VecValue::from(bits.to_vec())).unwrap();
    }
}

struct ChanWires {
    req_valid: Scalar,
    req_addr: Vector,
    resp_valid: Scalar,
    resp_data: Vector,
    resp_ready: Scalar,
}

/// VCD writer over the fixed harness wire set.
pub struct WaveProbe {
    writer: W,
    clock: Scalar,
    reset: Scalar,
    retired: Scalar,
    pc: Vector,
    chans: [ChanWires; 2],
}

impl WaveProbe {
    /// Create the output file and emit the VCD header.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = vcd_ng::Writer::new(BufWriter::new(file));
        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("heddle_top")?;

        let clock = Scalar::new(writer.add_wire(1, "clock")?);
        let reset = Scalar::new(writer.add_wire(1, "reset")?);
        let retired = Scalar::new(writer.add_wire(1, "inst_over")?);
        let pc = Vector::new(writer.add_wire(32, "pc")?);
        let mut chans = Vec::with_capacity(2);
        for tag in ["ifetch", "data"] {
            chans.push(ChanWires {
                req_valid: Scalar::new(writer.add_wire(1, &format!("{}_req_valid", tag))?),
                req_addr: Vector::new(writer.add_wire(32, &format!("{}_req_addr", tag))?),
                resp_valid: Scalar::new(writer.add_wire(1, &format!("{}_resp_valid", tag))?),
                resp_data: Vector::new(writer.add_wire(32, &format!("{}_resp_data", tag))?),
                resp_ready: Scalar::new(writer.add_wire(1, &format!("{}_resp_ready", tag))?),
            });
        }
        let mut chans = chans.into_iter();
        let chans = [chans.next().unwrap(), chans.next().unwrap()];

        writer.upscope()?;
        writer.enddefinitions()?;
        writer.begin(SimulationCommand::Dumpvars)?;

        Ok(Self {
            writer,
            clock,
            reset,
            retired,
            pc,
            chans,
        })
    }

    /// Append one phase snapshot at `time`.
    pub fn sample(&mut self, time: u64, s: &WaveSample) {
        self.writer.timestamp(time).unwrap();
        self.clock.put(&mut self.writer, s.clock);
        self.reset.put(&mut self.writer, s.reset);
        self.retired.put(&mut self.writer, s.retired);
        self.pc.put(&mut self.writer, s.pc);
        for (wires, cs) in self.chans.iter_mut().zip(s.chan.iter()) {
            wires.req_valid.put(&mut self.writer, cs.req_valid);
            wires.req_addr.put(&mut self.writer, cs.req_addr);
            wires.resp_valid.put(&mut self.writer, cs.resp_valid);
            wires.resp_data.put(&mut self.writer, cs.resp_data);
            wires.resp_ready.put(&mut self.writer, cs.resp_ready);
        }
    }
}
