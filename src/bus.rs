// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Bus transaction emulator.
//!
//! Stands in for the memory fabric the core expects: one instruction-fetch
//! channel and one data channel, each a valid/ready handshake with a single
//! outstanding transaction. A request observed on the sampling phase while
//! the channel is idle is captured and serviced against [`PhysMem`]
//! immediately (writes commit synchronously, reads latch the fetched word);
//! the response stays valid on the channel until the core asserts
//! response-ready. There is no arbitration, pipelining or burst support, and
//! a never-ready core keeps its channel pending forever.
//!
//! A request-valid whose lines differ from the transaction in flight is a
//! protocol violation by the core: it is counted and logged, never accepted.
//! Holding the accepted request's lines steady while waiting is tolerated.

use crate::core::{BusRequest, Channel, CoreModel};
use crate::mem::PhysMem;

/// One serviced transaction, as kept by the per-channel access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    pub addr: u32,
    pub data: u32,
    pub write: bool,
    pub mask: u8,
}

/// Handshake state of a single channel.
#[derive(Default)]
pub struct BusChannel {
    pending: bool,
    resp_data: u32,
    latched: Option<BusRequest>,
    warned: bool,
    pub reads: u64,
    pub writes: u64,
    pub violations: u64,
    pub accesses: Vec<AccessRecord>,
}

impl BusChannel {
    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn resp_data(&self) -> u32 {
        self.resp_data
    }
}

/// The two-channel emulator. Serviced once per sampling phase by the cycle
/// driver.
pub struct BusEmu {
    chans: [BusChannel; 2],
    /// Log each serviced access through clilog.
    pub mtrace: bool,
    /// Keep serviced accesses in the per-channel [`BusChannel::accesses`] log.
    pub record: bool,
}

impl BusEmu {
    pub fn new() -> Self {
        Self {
            chans: [BusChannel::default(), BusChannel::default()],
            mtrace: false,
            record: false,
        }
    }

    pub fn chan(&self, ch: Channel) -> &BusChannel {
        &self.chans[ch as usize]
    }

    /// Drop any in-flight transaction. Called when the core is put through
    /// its reset sequence.
    pub fn reset<C: CoreModel>(&mut self, core: &mut C) {
        for ch in Channel::ALL {
            self.chans[ch as usize].pending = false;
            self.chans[ch as usize].latched = None;
            core.drive_resp(ch, None);
        }
    }

    /// One sampling-phase step over both channels.
    pub fn service<C: CoreModel>(&mut self, core: &mut C, mem: &mut PhysMem) {
        for ch in Channel::ALL {
            self.service_chan(ch, core, mem);
        }
    }

    fn service_chan<C: CoreModel>(&mut self, ch: Channel, core: &mut C, mem: &mut PhysMem) {
        let st = &mut self.chans[ch as usize];
        if st.pending {
            if let Some(req) = core.bus_request(ch) {
                if st.latched != Some(req) {
                    st.violations += 1;
                    if !st.warned {
                        st.warned = true;
                        clilog::warn!(
                            "{} channel raised a new request at {:#010x} while one is \
                             in flight; dropped (further drops counted silently)",
                            ch.tag(),
                            req.addr
                        );
                    }
                }
            }
            if core.resp_ready(ch) {
                st.pending = false;
                st.latched = None;
                core.drive_resp(ch, None);
            } else {
                // response-valid stays asserted until the core takes it
                core.drive_resp(ch, Some(st.resp_data));
            }
            return;
        }

        if let Some(req) = core.bus_request(ch) {
            let data = match req.write {
                Some(w) => {
                    mem.write_bytes(req.addr, w.data, w.mask);
                    st.writes += 1;
                    if self.record {
                        st.accesses.push(AccessRecord {
                            addr: req.addr,
                            data: w.data,
                            write: true,
                            mask: w.mask,
                        });
                    }
                    if self.mtrace {
                        clilog::info!(
                            "[mtrace] {} W addr={:#010x} data={:#010x} mask={:#06b}",
                            ch.tag(),
                            req.addr,
                            w.data,
                            w.mask
                        );
                    }
                    0
                }
                None => {
                    let word = mem.read_word(req.addr);
                    st.reads += 1;
                    if self.record {
                        st.accesses.push(AccessRecord {
                            addr: req.addr,
                            data: word,
                            write: false,
                            mask: 0,
                        });
                    }
                    if self.mtrace {
                        clilog::info!(
                            "[mtrace] {} R addr={:#010x} data={:#010x}",
                            ch.tag(),
                            req.addr,
                            word
                        );
                    }
                    word
                }
            };
            st.resp_data = data;
            st.pending = true;
            st.latched = Some(req);
            core.drive_resp(ch, Some(data));
        }
    }
}
