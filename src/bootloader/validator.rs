//! Startup check of the installed application image

use crate::hal::FlashController;
use crate::logger::debug;
use crate::protocol::crc;
use crate::protocol::{AppHeader, APP_CODE_ADDR, APP_HEADER_ADDR, PAGE_SIZE};

/// Why the bootloader stayed resident. The value is the number of error-LED
/// flashes per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PostCode {
    NoApplication = 1,
    InvalidHeader = 2,
    CrcMismatch = 3,
}

impl PostCode {
    pub fn flashes(self) -> u8 {
        self as u8
    }
}

/// Check header and code, stopping at the first failure. Unlike Verify,
/// an empty or oversized image never boots.
///
/// Reads flash through the controller's memory window only; nothing is
/// unlocked or written, so this is safe to run before any driver exists.
pub fn validate_app<C: FlashController>(ctrl: &C) -> Result<AppHeader, PostCode> {
    let mut page = [0xFF; PAGE_SIZE];
    page.copy_from_slice(ctrl.memory(APP_HEADER_ADDR, PAGE_SIZE));
    let header = AppHeader::from_bytes(&page);

    if header.is_erased() {
        return Err(PostCode::NoApplication);
    }
    if let Err(e) = header.check() {
        debug!("header rejected: {}", e);
        return Err(PostCode::InvalidHeader);
    }
    if header.entry_point != APP_CODE_ADDR {
        debug!("bad entry point {=u32:#x}", header.entry_point);
        return Err(PostCode::InvalidHeader);
    }
    if !header.size_in_bounds() {
        debug!("bad size {=u32}", header.app_size);
        return Err(PostCode::InvalidHeader);
    }

    let code = ctrl.memory(APP_CODE_ADDR, header.app_size as usize);
    if crc::crc32(code) != header.app_crc32 {
        return Err(PostCode::CrcMismatch);
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimFlash;
    use crate::protocol::{APP_MAX_SIZE, APP_MAGIC};

    fn install(sim: &mut SimFlash, header: &AppHeader, code: &[u8]) {
        sim.load(APP_HEADER_ADDR, &header.to_bytes());
        sim.load(APP_CODE_ADDR, code);
    }

    #[test]
    fn consistent_image_validates() {
        let code = [0x6F, 0x00, 0x00, 0x00, 0x13, 0x05, 0x10, 0x00];
        let header = AppHeader::for_image(&code, 1, 2, 4);
        let mut sim = SimFlash::new();
        install(&mut sim, &header, &code);

        assert_eq!(validate_app(&sim), Ok(header));
    }

    #[test]
    fn erased_flash_means_no_application() {
        assert_eq!(validate_app(&SimFlash::new()), Err(PostCode::NoApplication));
    }

    #[test]
    fn header_faults_are_invalid_header() {
        let code = [0xA5; 32];
        let good = AppHeader::for_image(&code, 1, 0, 0);

        let mut wrong_magic = good;
        wrong_magic.magic = APP_MAGIC ^ 1;
        wrong_magic.seal();

        let mut wrong_entry = good;
        wrong_entry.entry_point = APP_CODE_ADDR + 4;
        wrong_entry.seal();

        let mut empty = good;
        empty.app_size = 0;
        empty.seal();

        let mut oversized = good;
        oversized.app_size = APP_MAX_SIZE + 1;
        oversized.seal();

        let mut unsealed = good;
        unsealed.fw_ver_minor = 9;

        for header in [wrong_magic, wrong_entry, empty, oversized, unsealed] {
            let mut sim = SimFlash::new();
            install(&mut sim, &header, &code);
            assert_eq!(validate_app(&sim), Err(PostCode::InvalidHeader));
        }
    }

    #[test]
    fn altered_code_is_crc_mismatch() {
        let code = [0x11; 200];
        let header = AppHeader::for_image(&code, 1, 0, 0);
        let mut sim = SimFlash::new();
        install(&mut sim, &header, &code);
        sim.corrupt(APP_CODE_ADDR + 150, 0x01);

        assert_eq!(validate_app(&sim), Err(PostCode::CrcMismatch));
    }

    #[test]
    fn bytes_past_app_size_are_not_covered() {
        let code = [0x22; 64];
        let header = AppHeader::for_image(&code, 1, 0, 0);
        let mut sim = SimFlash::new();
        install(&mut sim, &header, &code);
        sim.corrupt(APP_CODE_ADDR + 64, 0xFF);

        assert!(validate_app(&sim).is_ok());
    }

    #[test]
    fn flash_counts_follow_code() {
        assert_eq!(PostCode::NoApplication.flashes(), 1);
        assert_eq!(PostCode::InvalidHeader.flashes(), 2);
        assert_eq!(PostCode::CrcMismatch.flashes(), 3);
    }
}
