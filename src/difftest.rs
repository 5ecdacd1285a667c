// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Differential tester: lock-step comparison against a reference model.
//!
//! The reference model is an instruction-accurate interpreter loaded from a
//! shared object. It exposes the four-call contract in [`ref_ffi`]: one-time
//! init, bulk memory copy, full-context register copy, and an exec-n-
//! instructions entry point. After every retirement of the core under test
//! the harness steps the reference by one instruction, pulls its context
//! back, and compares every slot of the exchange layout (PC, all 32 GPRs
//! including `x0`, the four machine CSRs). Comparison never stops at the
//! first divergent slot; the report of the first bad instruction should show
//! everything that went wrong at once.

use crate::state::{CpuContext, GPR_NAMES};
use libloading::Library;
use std::fmt;
use std::path::Path;

// ── Comparison ──────────────────────────────────────────────────────────────

/// One compared slot of the exchange layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffField {
    Pc,
    Gpr(usize),
    Mcause,
    Mepc,
    Mstatus,
    Mtvec,
}

impl fmt::Display for DiffField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiffField::Pc => write!(f, "pc"),
            DiffField::Gpr(i) => write!(f, "x{} ({})", i, GPR_NAMES[*i]),
            DiffField::Mcause => write!(f, "mcause"),
            DiffField::Mepc => write!(f, "mepc"),
            DiffField::Mstatus => write!(f, "mstatus"),
            DiffField::Mtvec => write!(f, "mtvec"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub field: DiffField,
    pub ref_val: u32,
    pub dut_val: u32,
}

/// Compare two contexts slot by slot. Order is PC, `x0`..`x31`, then the
/// CSRs; every divergent slot is reported.
pub fn compare(reference: &CpuContext, dut: &CpuContext) -> Vec<Mismatch> {
    let mut out = Vec::new();
    let mut check = |field: DiffField, ref_val: u32, dut_val: u32| {
        if ref_val != dut_val {
            out.push(Mismatch {
                field,
                ref_val,
                dut_val,
            });
        }
    };
    check(DiffField::Pc, reference.pc, dut.pc);
    for i in 0..32 {
        check(DiffField::Gpr(i), reference.gpr[i], dut.gpr[i]);
    }
    check(DiffField::Mcause, reference.csr.mcause, dut.csr.mcause);
    check(DiffField::Mepc, reference.csr.mepc, dut.csr.mepc);
    check(DiffField::Mstatus, reference.csr.mstatus, dut.csr.mstatus);
    check(DiffField::Mtvec, reference.csr.mtvec, dut.csr.mtvec);
    out
}

/// Side-by-side dump of both contexts, divergent rows marked. Rendered once
/// when a step diverges.
pub struct Report<'a> {
    pub reference: &'a CpuContext,
    pub dut: &'a CpuContext,
}

fn report_row(f: &mut fmt::Formatter<'_>, name: &str, r: u32, d: u32) -> fmt::Result {
    let mark = if r != d { "  << MISMATCH" } else { "" };
    writeln!(f, "{:<8} ref = 0x{:08x}  dut = 0x{:08x}{}", name, r, d, mark)
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        report_row(f, "pc", self.reference.pc, self.dut.pc)?;
        for i in 0..32 {
            report_row(f, GPR_NAMES[i], self.reference.gpr[i], self.dut.gpr[i])?;
        }
        report_row(f, "mcause", self.reference.csr.mcause, self.dut.csr.mcause)?;
        report_row(f, "mepc", self.reference.csr.mepc, self.dut.csr.mepc)?;
        report_row(f, "mstatus", self.reference.csr.mstatus, self.dut.csr.mstatus)?;
        report_row(f, "mtvec", self.reference.csr.mtvec, self.dut.csr.mtvec)
    }
}

// ── Reference model interface ───────────────────────────────────────────────

/// Copy direction of the exchange calls, from the harness's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToDut,
    ToRef,
}

impl Direction {
    fn flag(self) -> bool {
        matches!(self, Direction::ToRef)
    }
}

/// Instruction-accurate reference model. By the time a value of this type
/// exists the model has run its one-time init and is ready to be seeded.
pub trait RefModel {
    /// Copy `buf.len()` bytes between `buf` and reference guest memory at
    /// physical address `addr`.
    fn memcpy(&mut self, addr: u32, buf: &mut [u8], dir: Direction);
    /// Copy the full architectural context.
    fn regcpy(&mut self, ctx: &mut CpuContext, dir: Direction);
    /// Execute `n` instructions.
    fn exec(&mut self, n: u64);
}

/// C ABI a reference shared object must export. `regcpy` exchanges the
/// [`CpuContext`] layout; the direction flag is false toward the caller,
/// true toward the reference.
pub mod ref_ffi {
    use crate::state::CpuContext;
    use std::os::raw::c_int;

    pub type InitFn = unsafe extern "C" fn(c_int);
    pub type MemcpyFn = unsafe extern "C" fn(u32, *mut u8, usize, bool);
    pub type RegcpyFn = unsafe extern "C" fn(*mut CpuContext, bool);
    pub type ExecFn = unsafe extern "C" fn(u64);
}

/// Failure while binding a reference shared object.
#[derive(Debug)]
pub enum RefLoadError {
    Open(String),
    Symbol(String),
}

impl fmt::Display for RefLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RefLoadError::Open(e) => write!(f, "cannot open reference model: {}", e),
            RefLoadError::Symbol(s) => write!(f, "reference model lacks symbol {}", s),
        }
    }
}

impl std::error::Error for RefLoadError {}

#[derive(Debug)]
struct RefVt {
    memcpy: ref_ffi::MemcpyFn,
    regcpy: ref_ffi::RegcpyFn,
    exec: ref_ffi::ExecFn,
}

/// Reference model bound from a shared object; keeps the library mapped for
/// its own lifetime.
#[derive(Debug)]
pub struct DlRef {
    vt: RefVt,
    _lib: Library,
}

macro_rules! ref_sym {
    ($lib:expr, $ty:ty, $name:literal) => {
        match unsafe { $lib.get::<$ty>(concat!($name, "\0").as_bytes()) } {
            Ok(sym) => *sym,
            Err(_) => return Err(RefLoadError::Symbol($name.to_string())),
        }
    };
}

impl DlRef {
    /// Bind the four-call contract and run the model's one-time init.
    pub fn open(path: &Path) -> Result<Self, RefLoadError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| RefLoadError::Open(e.to_string()))?;
        let init: ref_ffi::InitFn = ref_sym!(lib, ref_ffi::InitFn, "difftest_init");
        let vt = RefVt {
            memcpy: ref_sym!(lib, ref_ffi::MemcpyFn, "difftest_memcpy"),
            regcpy: ref_sym!(lib, ref_ffi::RegcpyFn, "difftest_regcpy"),
            exec: ref_sym!(lib, ref_ffi::ExecFn, "difftest_exec"),
        };
        unsafe { init(0) };
        Ok(Self { vt, _lib: lib })
    }
}

impl RefModel for DlRef {
    fn memcpy(&mut self, addr: u32, buf: &mut [u8], dir: Direction) {
        unsafe { (self.vt.memcpy)(addr, buf.as_mut_ptr(), buf.len(), dir.flag()) }
    }

    fn regcpy(&mut self, ctx: &mut CpuContext, dir: Direction) {
        unsafe { (self.vt.regcpy)(ctx as *mut CpuContext, dir.flag()) }
    }

    fn exec(&mut self, n: u64) {
        unsafe { (self.vt.exec)(n) }
    }
}

// ── Lock-step orchestration ─────────────────────────────────────────────────

/// Drives the reference in lock step with the core under test.
pub struct Difftest {
    reference: Box<dyn RefModel>,
    last_ref: CpuContext,
}

impl Difftest {
    pub fn new(reference: Box<dyn RefModel>) -> Self {
        Self {
            reference,
            last_ref: CpuContext::default(),
        }
    }

    /// Bring the reference in line with the just-reset core: same memory
    /// image at the load address, same architectural context.
    pub fn seed(&mut self, mem_base: u32, image: &[u8], ctx: &CpuContext) {
        if !image.is_empty() {
            let mut buf = image.to_vec();
            self.reference.memcpy(mem_base, &mut buf, Direction::ToRef);
        }
        let mut c = *ctx;
        self.reference.regcpy(&mut c, Direction::ToRef);
    }

    /// Step the reference one instruction and compare its context against
    /// the one captured from the core after the matching retirement.
    pub fn step(&mut self, dut: &CpuContext) -> Vec<Mismatch> {
        self.reference.exec(1);
        let mut ctx = CpuContext::default();
        self.reference.regcpy(&mut ctx, Direction::ToDut);
        self.last_ref = ctx;
        compare(&ctx, dut)
    }

    /// Reference context captured by the most recent [`step`](Self::step).
    pub fn last_ref(&self) -> &CpuContext {
        &self.last_ref
    }
}
