//! Internal flash driver
//!
//! Wraps a [`FlashController`] with the unlock sequence, bounded polling and
//! the area guards that keep the bootloader from erasing itself. Every public
//! operation that unlocks the controller locks it again before returning,
//! on the error paths too.

use crate::config::FLASH_TIMEOUT_POLLS;
use crate::hal::FlashController;
use crate::logger::{debug, warn};
use crate::protocol::crc;
use crate::protocol::{AppHeader, BootState, APP_HEADER_ADDR, BOOT_STATE_ADDR, FLASH_END, PAGE_SIZE};

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    Misaligned,
    /// Address falls inside the bootloader
    ProtectedRegion,
    OutOfRange,
    UnlockFailed,
    Timeout,
    WriteProtected,
    /// Read-back differs from the source at `addr`
    VerifyFailed { addr: u32 },
}

pub type Result<T> = core::result::Result<T, FlashError>;

pub struct Flash<C: FlashController> {
    ctrl: C,
    timeout: u32,
}

impl<C: FlashController> Flash<C> {
    pub fn new(ctrl: C) -> Self {
        Self::with_timeout(ctrl, FLASH_TIMEOUT_POLLS)
    }

    /// `polls` bounds every busy-wait in the driver.
    pub fn with_timeout(ctrl: C, polls: u32) -> Self {
        let mut flash = Self { ctrl, timeout: polls };
        flash.lock();
        flash
    }

    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    pub fn release(self) -> C {
        self.ctrl
    }

    pub fn unlock(&mut self) -> Result<()> {
        if !self.ctrl.is_locked() {
            return Ok(());
        }

        self.ctrl.write_key(KEY1);
        self.ctrl.write_key(KEY2);

        let mut polls = self.timeout;
        while self.ctrl.is_locked() {
            if polls == 0 {
                warn!("flash unlock timed out");
                return Err(FlashError::UnlockFailed);
            }
            polls -= 1;
        }
        Ok(())
    }

    pub fn lock(&mut self) {
        self.ctrl.lock();
    }

    /// Erase one page. Fails without touching the controller if `addr` is
    /// unaligned, inside the bootloader or past the end of flash.
    pub fn erase_page(&mut self, addr: u32) -> Result<()> {
        check_page(addr)?;
        let mut session = self.session()?;
        session.erase(addr)
    }

    /// Erase boot state, application header and code in one unlocked session.
    pub fn erase_app(&mut self) -> Result<()> {
        let mut session = self.session()?;
        for addr in (BOOT_STATE_ADDR..FLASH_END).step_by(PAGE_SIZE) {
            session.erase(addr).map_err(|e| {
                warn!("erase failed at {=u32:#x}", addr);
                e
            })?;
        }
        debug!("application area erased");
        Ok(())
    }

    /// Program one page in 32-bit words and read every byte back.
    ///
    /// The target must already be erased; programming can only clear bits,
    /// and the read-back catches a page that was not.
    pub fn write_page(&mut self, addr: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        check_page(addr)?;
        {
            let mut session = self.session()?;
            session.program(addr, data)?;
        }

        let written = self.ctrl.memory(addr, PAGE_SIZE);
        if let Some(pos) = written.iter().zip(data.iter()).position(|(a, b)| a != b) {
            let at = addr + pos as u32;
            warn!("verify failed at {=u32:#x}", at);
            return Err(FlashError::VerifyFailed { addr: at });
        }
        Ok(())
    }

    /// CRC32 straight over mapped flash. The range is clipped at flash end.
    pub fn calculate_crc(&self, start: u32, len: u32) -> u32 {
        let len = len.min(FLASH_END.saturating_sub(start));
        crc::crc32(self.ctrl.memory(start, len as usize))
    }

    pub fn read(&self, addr: u32, len: usize) -> &[u8] {
        self.ctrl.memory(addr, len)
    }

    pub fn read_page(&self, addr: u32) -> [u8; PAGE_SIZE] {
        let mut page = [0xFF; PAGE_SIZE];
        page.copy_from_slice(self.ctrl.memory(addr, PAGE_SIZE));
        page
    }

    pub fn app_header(&self) -> AppHeader {
        AppHeader::from_bytes(&self.read_page(APP_HEADER_ADDR))
    }

    pub fn boot_state(&self) -> BootState {
        BootState::from_bytes(&self.read_page(BOOT_STATE_ADDR))
    }

    /// Erase the boot-state page, dropping any pending update request.
    pub fn clear_boot_state(&mut self) -> Result<()> {
        self.erase_page(BOOT_STATE_ADDR)
    }

    pub fn write_boot_state(&mut self, state: &BootState) -> Result<()> {
        self.erase_page(BOOT_STATE_ADDR)?;
        self.write_page(BOOT_STATE_ADDR, &state.to_bytes())
    }

    fn session(&mut self) -> Result<Session<'_, C>> {
        if let Err(e) = self.unlock() {
            self.lock();
            return Err(e);
        }
        Ok(Session { flash: self })
    }

    fn poll_ready(&mut self) -> nb::Result<(), FlashError> {
        if self.ctrl.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        if self.ctrl.write_protect_error() {
            self.ctrl.clear_write_protect_error();
            return Err(nb::Error::Other(FlashError::WriteProtected));
        }
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<()> {
        let mut polls = self.timeout;
        loop {
            match self.poll_ready() {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) if polls == 0 => return Err(FlashError::Timeout),
                Err(nb::Error::WouldBlock) => polls -= 1,
            }
        }
    }
}

fn check_page(addr: u32) -> Result<()> {
    if addr as usize % PAGE_SIZE != 0 {
        debug!("rejecting unaligned page {=u32:#x}", addr);
        return Err(FlashError::Misaligned);
    }
    if addr < BOOT_STATE_ADDR {
        debug!("rejecting bootloader page {=u32:#x}", addr);
        return Err(FlashError::ProtectedRegion);
    }
    if addr >= FLASH_END {
        return Err(FlashError::OutOfRange);
    }
    Ok(())
}

/// Unlocked controller. Dropping it relocks flash.
struct Session<'a, C: FlashController> {
    flash: &'a mut Flash<C>,
}

impl<C: FlashController> Session<'_, C> {
    fn erase(&mut self, addr: u32) -> Result<()> {
        self.flash.wait_ready()?;
        self.flash.ctrl.start_page_erase(addr);
        let done = self.flash.wait_ready();
        self.flash.ctrl.end_page_erase();
        done
    }

    fn program(&mut self, addr: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        self.flash.wait_ready()?;
        self.flash.ctrl.begin_program();

        let mut done = Ok(());
        for (i, word) in data.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            self.flash.ctrl.program_word(addr + 4 * i as u32, word);
            done = self.flash.wait_ready();
            if done.is_err() {
                break;
            }
        }

        self.flash.ctrl.end_program();
        done
    }
}

impl<C: FlashController> Drop for Session<'_, C> {
    fn drop(&mut self) {
        self.flash.ctrl.lock();
    }
}
