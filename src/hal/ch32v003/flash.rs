//! FLASH control block

use super::Reg;
use crate::hal::FlashController;
use crate::protocol::FLASH_END;

const FLASH_BASE: usize = 0x4002_2000;
const ACTLR: Reg = Reg::new(FLASH_BASE, 0x00);
const KEYR: Reg = Reg::new(FLASH_BASE, 0x04);
const STATR: Reg = Reg::new(FLASH_BASE, 0x0C);
const CTLR: Reg = Reg::new(FLASH_BASE, 0x10);
const ADDR: Reg = Reg::new(FLASH_BASE, 0x14);

const STATR_BSY: u32 = 1 << 0;
const STATR_WRPRTERR: u32 = 1 << 4;

const CTLR_PG: u32 = 1 << 0;
const CTLR_PER: u32 = 1 << 1;
const CTLR_STRT: u32 = 1 << 6;
const CTLR_LOCK: u32 = 1 << 7;

/// Code flash is mirrored here. Reads and word programming go through the
/// mirror so no pointer is ever built from address zero.
const CODE_ALIAS: usize = 0x0800_0000;

/// One wait state, required above 24MHz.
pub(crate) fn set_latency_for_48mhz() {
    ACTLR.write((ACTLR.read() & !0b11) | 0b01);
}

/// Owner of the flash-control registers. Only one may exist.
pub struct Ch32Flash {
    _private: (),
}

impl Ch32Flash {
    /// # Safety
    ///
    /// Caller must ensure no other `Ch32Flash` exists and nothing else
    /// touches the FLASH block.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl FlashController for Ch32Flash {
    fn is_locked(&self) -> bool {
        CTLR.read() & CTLR_LOCK != 0
    }

    fn write_key(&mut self, key: u32) {
        KEYR.write(key);
    }

    fn lock(&mut self) {
        CTLR.set_bits(CTLR_LOCK);
    }

    fn is_busy(&self) -> bool {
        STATR.read() & STATR_BSY != 0
    }

    fn write_protect_error(&self) -> bool {
        STATR.read() & STATR_WRPRTERR != 0
    }

    fn clear_write_protect_error(&mut self) {
        // write-one-to-clear
        STATR.write(STATR_WRPRTERR);
    }

    fn start_page_erase(&mut self, addr: u32) {
        CTLR.set_bits(CTLR_PER);
        ADDR.write(addr);
        CTLR.set_bits(CTLR_STRT);
    }

    fn end_page_erase(&mut self) {
        CTLR.clear_bits(CTLR_PER);
    }

    fn begin_program(&mut self) {
        CTLR.set_bits(CTLR_PG);
    }

    fn program_word(&mut self, addr: u32, word: u32) {
        let target = (CODE_ALIAS + addr as usize) as *mut u32;
        // SAFETY: the driver only passes word-aligned addresses inside flash
        unsafe { core::ptr::write_volatile(target, word) }
    }

    fn end_program(&mut self) {
        CTLR.clear_bits(CTLR_PG);
    }

    fn memory(&self, addr: u32, len: usize) -> &[u8] {
        let start = addr.min(FLASH_END) as usize;
        let len = len.min(FLASH_END as usize - start);
        // SAFETY: the range is clipped to on-chip flash, which is always
        // mapped and readable
        unsafe { core::slice::from_raw_parts((CODE_ALIAS + start) as *const u8, len) }
    }
}
