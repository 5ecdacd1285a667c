// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Heddle: cycle-accurate co-simulation and differential-testing harness
//! for soft RISC-V cores.
//!
//! Heddle drives a clocked core model one edge at a time, stands in for the
//! memory fabric the core expects (two valid/ready channels with
//! single-outstanding latching and byte-masked stores), mirrors committed
//! architectural state into a host-side shadow, and cross-checks every
//! retired instruction against an independently implemented reference
//! instruction-set simulator.
//!
//! # Per-instruction flow
//!
//! ```text
//! core shared object
//!   → DlCore        (core: signal-level model behind the CoreModel trait)
//!   → CycleDriver   (cycle: two-phase clocking, reset sequencing, time base)
//!   → BusEmu        (bus: valid/ready channels backed by PhysMem)
//!   → ArchState     (state: shadow of the just-committed architectural state)
//!   → Difftest      (difftest: lock-step compare against a reference model)
//!   → RunState      (session: RUNNING / END / ABORT bookkeeping)
//! ```
//!
//! # Key modules
//!
//! - [`mem`]: flat physical memory with aligned reads and masked-merge writes
//! - [`bus`]: per-channel transaction emulator with protocol-violation counting
//! - [`cycle`]: clock phases, reset sequencing, waveform feed
//! - [`state`]: shadow CPU state and the reference exchange layout
//! - [`core`]: core-model trait plus the shared-object binding
//! - [`difftest`]: comparator, postmortem report, reference-model binding
//! - [`session`]: per-run object graph and the single-step entry point
//! - [`profile`]: per-core-variant configuration (addresses, phases, encodings)
//! - [`wave`]: VCD probe for the handshake-level signals
//! - [`scripted`]: in-process core/reference stand-ins for tests and benches

pub mod mem;

pub mod bus;

pub mod cycle;

pub mod state;

pub mod core;

pub mod difftest;

pub mod session;

pub mod profile;

pub mod wave;

pub mod scripted;
