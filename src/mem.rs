// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Flat physical memory backing store.
//!
//! Covers the address window the bus emulator services for the core under
//! test. Reads are word-aligned; stores go through a byte-masked merge so
//! byte, halfword and word stores share a single code path.

/// Expand a 4-bit byte-lane mask into a 32-bit merge mask.
#[inline]
pub fn lane_mask(mask: u8) -> u32 {
    let mut m = 0u32;
    for lane in 0..4 {
        if mask >> lane & 1 != 0 {
            m |= 0xFF << (lane * 8);
        }
    }
    m
}

/// Byte-addressable memory over `[base, base + len)`.
pub struct PhysMem {
    base: u32,
    data: Vec<u8>,
}

impl PhysMem {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    /// Copy a boot image to the low end of the window.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), String> {
        if image.len() > self.data.len() {
            return Err(format!(
                "boot image ({} bytes) exceeds serviced window ({} bytes)",
                image.len(),
                self.data.len()
            ));
        }
        self.data[..image.len()].copy_from_slice(image);
        Ok(())
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Word-aligned offset of `addr` inside the window, if it falls there.
    #[inline]
    fn offset_of(&self, addr: u32) -> Option<usize> {
        let off = (addr & !0x3).wrapping_sub(self.base) as usize;
        if off < self.data.len() && self.data.len() - off >= 4 {
            Some(off)
        } else {
            None
        }
    }

    /// Aligned word read. The low address bits are masked off; reads outside
    /// the serviced window return zero rather than failing.
    pub fn read_word(&self, addr: u32) -> u32 {
        match self.offset_of(addr) {
            Some(off) => u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()),
            None => 0,
        }
    }

    /// Byte-masked word write. Bytes whose lane bit is clear keep their old
    /// value. Writes outside the serviced window are dropped.
    pub fn write_bytes(&mut self, addr: u32, word: u32, mask: u8) {
        if let Some(off) = self.offset_of(addr) {
            let old = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
            let m = lane_mask(mask);
            let merged = (old & !m) | (word & m);
            self.data[off..off + 4].copy_from_slice(&merged.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = 0x2000_0000;

    fn mem_with(word0: u32) -> PhysMem {
        let mut mem = PhysMem::new(BASE, 64);
        mem.write_bytes(BASE, word0, 0b1111);
        mem
    }

    #[test]
    fn lane_mask_expansion() {
        assert_eq!(lane_mask(0b0000), 0x0000_0000);
        assert_eq!(lane_mask(0b0001), 0x0000_00FF);
        assert_eq!(lane_mask(0b0010), 0x0000_FF00);
        assert_eq!(lane_mask(0b1100), 0xFFFF_0000);
        assert_eq!(lane_mask(0b1111), 0xFFFF_FFFF);
    }

    #[test]
    fn masked_write_preserves_unselected_bytes() {
        for mask in 0u8..16 {
            let mut mem = mem_with(0x1122_3344);
            mem.write_bytes(BASE, 0xAABB_CCDD, mask);
            let got = mem.read_word(BASE);
            for lane in 0..4 {
                let byte = (got >> (lane * 8)) & 0xFF;
                let expect = if mask >> lane & 1 != 0 {
                    (0xAABB_CCDDu32 >> (lane * 8)) & 0xFF
                } else {
                    (0x1122_3344u32 >> (lane * 8)) & 0xFF
                };
                assert_eq!(byte, expect, "mask {:#06b} lane {}", mask, lane);
            }
        }
    }

    #[test]
    fn masked_write_is_alignment_independent() {
        let mut mem = PhysMem::new(BASE, 64);
        mem.write_bytes(BASE + 8, 0xFFFF_FFFF, 0b1111);
        mem.write_bytes(BASE + 8, 0x0000_5600, 0b0010);
        assert_eq!(mem.read_word(BASE + 8), 0xFFFF_56FF);
    }

    #[test]
    fn read_masks_low_address_bits() {
        let mem = mem_with(0xCAFE_F00D);
        assert_eq!(mem.read_word(BASE + 1), 0xCAFE_F00D);
        assert_eq!(mem.read_word(BASE + 3), 0xCAFE_F00D);
    }

    #[test]
    fn out_of_window_read_returns_zero() {
        let mem = mem_with(0xDEAD_BEEF);
        assert_eq!(mem.read_word(BASE - 4), 0);
        assert_eq!(mem.read_word(BASE + 64), 0);
        assert_eq!(mem.read_word(0), 0);
    }

    #[test]
    fn out_of_window_write_is_dropped() {
        let mut mem = mem_with(0x0101_0101);
        mem.write_bytes(BASE + 64, 0xFFFF_FFFF, 0b1111);
        assert_eq!(mem.read_word(BASE), 0x0101_0101);
    }

    #[test]
    fn image_load_round_trip() {
        let mut mem = PhysMem::new(BASE, 16);
        mem.load_image(&[0x73, 0x00, 0x10, 0x00, 0xEF, 0xBE, 0xAD, 0xDE])
            .unwrap();
        assert_eq!(mem.read_word(BASE), 0x0010_0073);
        assert_eq!(mem.read_word(BASE + 4), 0xDEAD_BEEF);
    }

    #[test]
    fn oversize_image_is_rejected() {
        let mut mem = PhysMem::new(BASE, 8);
        assert!(mem.load_image(&[0u8; 9]).is_err());
    }
}
