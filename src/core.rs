// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Signal-level interface to the hardware core under test.
//!
//! The harness never looks inside the core: it toggles clock/reset, lets the
//! model settle, and reads back the externally observable signals (bus
//! request lines, debug/commit state, trap indication) defined by
//! [`CoreModel`]. Real cores arrive as a shared object exporting the C ABI
//! in [`core_ffi`], wrapped by [`DlCore`]; tests use the scripted model from
//! [`crate::scripted`].

use crate::state::CsrSet;
use libloading::Library;
use std::path::Path;

// ── Channel and request-line types ──────────────────────────────────────────

/// Memory channels a core drives, one request port each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Ifetch = 0,
    Data = 1,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ifetch, Channel::Data];

    pub fn tag(self) -> &'static str {
        match self {
            Channel::Ifetch => "ifetch",
            Channel::Data => "data",
        }
    }
}

/// Write-enable side of a data-channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWrite {
    pub data: u32,
    pub mask: u8,
}

/// One request as observed on a channel's request lines while
/// request-valid is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRequest {
    pub addr: u32,
    /// `None` for a read; the instruction channel only ever reads.
    pub write: Option<BusWrite>,
}

// ── Core model trait ────────────────────────────────────────────────────────

/// Externally observable signals of the core under test.
///
/// All methods are plain signal reads/writes; none of them advances time.
/// The cycle driver owns the clocking discipline and calls [`eval`]
/// whenever inputs changed.
///
/// [`eval`]: CoreModel::eval
pub trait CoreModel {
    fn set_clock(&mut self, level: bool);
    fn set_reset(&mut self, active: bool);
    /// Settle combinational logic after input changes.
    fn eval(&mut self);

    /// Retirement strobe: true while the model exposes a just-committed
    /// instruction on its debug signals.
    fn retired(&self) -> bool;
    /// Dedicated trap-detected signal (asserted at commit of a trapping
    /// instruction and ignored once the run has ended).
    fn trap(&self) -> bool;

    fn debug_pc(&self) -> u32;
    fn debug_dnpc(&self) -> u32;
    fn debug_gpr(&self, idx: usize) -> u32;
    fn debug_csrs(&self) -> CsrSet;

    /// Request lines of `ch`: `Some` while request-valid is asserted.
    fn bus_request(&self, ch: Channel) -> Option<BusRequest>;
    /// Response-ready line of `ch`.
    fn resp_ready(&self, ch: Channel) -> bool;
    /// Drive the response lines of `ch`: `Some(word)` asserts
    /// response-valid with that data, `None` deasserts it.
    fn drive_resp(&mut self, ch: Channel, resp: Option<u32>);
}

// ── C ABI for shared-object cores ───────────────────────────────────────────

/// C ABI a core shared object must export.
///
/// Channel argument is 0 for instruction fetch, 1 for data; the write lines
/// are only meaningful on the data channel. CSR getter indices follow the
/// debug-port order below.
pub mod core_ffi {
    use std::os::raw::c_int;

    #[repr(C)]
    pub struct CoreHandle {
        _private: [u8; 0],
    }

    pub const CSR_MCAUSE: c_int = 0;
    pub const CSR_MEPC: c_int = 1;
    pub const CSR_MSTATUS: c_int = 2;
    pub const CSR_MTVEC: c_int = 3;

    pub type NewFn = unsafe extern "C" fn() -> *mut CoreHandle;
    pub type FreeFn = unsafe extern "C" fn(*mut CoreHandle);
    pub type SetLevelFn = unsafe extern "C" fn(*mut CoreHandle, c_int);
    pub type EvalFn = unsafe extern "C" fn(*mut CoreHandle);
    pub type FlagFn = unsafe extern "C" fn(*const CoreHandle) -> c_int;
    pub type WordFn = unsafe extern "C" fn(*const CoreHandle) -> u32;
    pub type IndexedWordFn = unsafe extern "C" fn(*const CoreHandle, c_int) -> u32;
    pub type ChanFlagFn = unsafe extern "C" fn(*const CoreHandle, c_int) -> c_int;
    pub type ChanWordFn = unsafe extern "C" fn(*const CoreHandle, c_int) -> u32;
    pub type DriveRespFn = unsafe extern "C" fn(*mut CoreHandle, c_int, c_int, u32);
}

/// Failure while binding a core shared object.
#[derive(Debug)]
pub enum CoreLoadError {
    Open(String),
    Symbol(String),
    Construct,
}

impl std::fmt::Display for CoreLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CoreLoadError::Open(e) => write!(f, "cannot open core object: {}", e),
            CoreLoadError::Symbol(s) => write!(f, "core object lacks symbol {}", s),
            CoreLoadError::Construct => write!(f, "core constructor returned null"),
        }
    }
}

impl std::error::Error for CoreLoadError {}

#[derive(Debug)]
struct CoreVt {
    free: core_ffi::FreeFn,
    set_clock: core_ffi::SetLevelFn,
    set_reset: core_ffi::SetLevelFn,
    eval: core_ffi::EvalFn,
    retired: core_ffi::FlagFn,
    trap: core_ffi::FlagFn,
    debug_pc: core_ffi::WordFn,
    debug_dnpc: core_ffi::WordFn,
    debug_gpr: core_ffi::IndexedWordFn,
    debug_csr: core_ffi::IndexedWordFn,
    req_valid: core_ffi::ChanFlagFn,
    req_addr: core_ffi::ChanWordFn,
    req_wen: core_ffi::ChanFlagFn,
    req_wdata: core_ffi::ChanWordFn,
    req_wmask: core_ffi::ChanWordFn,
    resp_ready: core_ffi::ChanFlagFn,
    drive_resp: core_ffi::DriveRespFn,
}

/// Core model bound from a shared object; owns the handle and keeps the
/// library mapped for its own lifetime.
#[derive(Debug)]
pub struct DlCore {
    ptr: *mut core_ffi::CoreHandle,
    vt: CoreVt,
    _lib: Library,
}

macro_rules! vt_sym {
    ($lib:expr, $ty:ty, $name:literal) => {
        match unsafe { $lib.get::<$ty>(concat!($name, "\0").as_bytes()) } {
            Ok(sym) => *sym,
            Err(_) => return Err(CoreLoadError::Symbol($name.to_string())),
        }
    };
}

impl DlCore {
    pub fn open(path: &Path) -> Result<Self, CoreLoadError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| CoreLoadError::Open(e.to_string()))?;
        let new: core_ffi::NewFn = vt_sym!(lib, core_ffi::NewFn, "core_new");
        let vt = CoreVt {
            free: vt_sym!(lib, core_ffi::FreeFn, "core_free"),
            set_clock: vt_sym!(lib, core_ffi::SetLevelFn, "core_set_clock"),
            set_reset: vt_sym!(lib, core_ffi::SetLevelFn, "core_set_reset"),
            eval: vt_sym!(lib, core_ffi::EvalFn, "core_eval"),
            retired: vt_sym!(lib, core_ffi::FlagFn, "core_retired"),
            trap: vt_sym!(lib, core_ffi::FlagFn, "core_trap"),
            debug_pc: vt_sym!(lib, core_ffi::WordFn, "core_debug_pc"),
            debug_dnpc: vt_sym!(lib, core_ffi::WordFn, "core_debug_dnpc"),
            debug_gpr: vt_sym!(lib, core_ffi::IndexedWordFn, "core_debug_gpr"),
            debug_csr: vt_sym!(lib, core_ffi::IndexedWordFn, "core_debug_csr"),
            req_valid: vt_sym!(lib, core_ffi::ChanFlagFn, "core_req_valid"),
            req_addr: vt_sym!(lib, core_ffi::ChanWordFn, "core_req_addr"),
            req_wen: vt_sym!(lib, core_ffi::ChanFlagFn, "core_req_wen"),
            req_wdata: vt_sym!(lib, core_ffi::ChanWordFn, "core_req_wdata"),
            req_wmask: vt_sym!(lib, core_ffi::ChanWordFn, "core_req_wmask"),
            resp_ready: vt_sym!(lib, core_ffi::ChanFlagFn, "core_resp_ready"),
            drive_resp: vt_sym!(lib, core_ffi::DriveRespFn, "core_drive_resp"),
        };
        let ptr = unsafe { new() };
        if ptr.is_null() {
            return Err(CoreLoadError::Construct);
        }
        Ok(Self {
            ptr,
            vt,
            _lib: lib,
        })
    }
}

impl Drop for DlCore {
    fn drop(&mut self) {
        unsafe { (self.vt.free)(self.ptr) };
    }
}

impl CoreModel for DlCore {
    fn set_clock(&mut self, level: bool) {
        unsafe { (self.vt.set_clock)(self.ptr, level as i32) }
    }

    fn set_reset(&mut self, active: bool) {
        unsafe { (self.vt.set_reset)(self.ptr, active as i32) }
    }

    fn eval(&mut self) {
        unsafe { (self.vt.eval)(self.ptr) }
    }

    fn retired(&self) -> bool {
        unsafe { (self.vt.retired)(self.ptr) != 0 }
    }

    fn trap(&self) -> bool {
        unsafe { (self.vt.trap)(self.ptr) != 0 }
    }

    fn debug_pc(&self) -> u32 {
        unsafe { (self.vt.debug_pc)(self.ptr) }
    }

    fn debug_dnpc(&self) -> u32 {
        unsafe { (self.vt.debug_dnpc)(self.ptr) }
    }

    fn debug_gpr(&self, idx: usize) -> u32 {
        unsafe { (self.vt.debug_gpr)(self.ptr, idx as i32) }
    }

    fn debug_csrs(&self) -> CsrSet {
        unsafe {
            CsrSet {
                mcause: (self.vt.debug_csr)(self.ptr, core_ffi::CSR_MCAUSE),
                mepc: (self.vt.debug_csr)(self.ptr, core_ffi::CSR_MEPC),
                mstatus: (self.vt.debug_csr)(self.ptr, core_ffi::CSR_MSTATUS),
                mtvec: (self.vt.debug_csr)(self.ptr, core_ffi::CSR_MTVEC),
            }
        }
    }

    fn bus_request(&self, ch: Channel) -> Option<BusRequest> {
        let c = ch as i32;
        unsafe {
            if (self.vt.req_valid)(self.ptr, c) == 0 {
                return None;
            }
            let addr = (self.vt.req_addr)(self.ptr, c);
            let write = if ch == Channel::Data && (self.vt.req_wen)(self.ptr, c) != 0 {
                Some(BusWrite {
                    data: (self.vt.req_wdata)(self.ptr, c),
                    mask: (self.vt.req_wmask)(self.ptr, c) as u8,
                })
            } else {
                None
            };
            Some(BusRequest { addr, write })
        }
    }

    fn resp_ready(&self, ch: Channel) -> bool {
        unsafe { (self.vt.resp_ready)(self.ptr, ch as i32) != 0 }
    }

    fn drive_resp(&mut self, ch: Channel, resp: Option<u32>) {
        let (valid, data) = match resp {
            Some(d) => (1, d),
            None => (0, 0),
        };
        unsafe { (self.vt.drive_resp)(self.ptr, ch as i32, valid, data) }
    }
}
