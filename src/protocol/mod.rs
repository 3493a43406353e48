//! Register protocol shared between the bootloader and application firmware
//!
//! Everything in here is a data contract: memory layout, magic numbers,
//! the register map, command/status/error encodings and the two 64-byte
//! records kept in flash.

pub mod crc;
pub mod image;
pub mod registers;

pub use image::{AppHeader, BootState};
pub use registers::{BootloaderRegister, ClientRegister, CommonRegister, Register};

// Memory layout
pub const FLASH_BASE: u32 = 0x0000_0000;
pub const BOOTLOADER_SIZE: u32 = 0x0000_0C00;
pub const BOOT_STATE_ADDR: u32 = 0x0000_0C00;
pub const APP_HEADER_ADDR: u32 = 0x0000_0C40;
pub const APP_CODE_ADDR: u32 = 0x0000_0C80;
pub const FLASH_END: u32 = 0x0000_4000;
pub const FLASH_SIZE: usize = (FLASH_END - FLASH_BASE) as usize;
pub const APP_MAX_SIZE: u32 = FLASH_END - APP_CODE_ADDR;

/// Smallest erasable unit, also the size of both flash records.
pub const PAGE_SIZE: usize = 64;

pub const PROTOCOL_VERSION: u8 = 1;
pub const I2C_ADDRESS: u8 = 0x42;

/// Set in HW_TYPE while the bootloader is answering.
pub const BOOTLOADER_MODE_FLAG: u8 = 0x80;

pub const APP_MAGIC: u32 = 0x454D_4F57; // "WOME"
pub const BOOT_STATE_MAGIC: u32 = 0x424F_4F54; // "BOOT"

pub const STATE_NORMAL: u8 = 0x00;
pub const STATE_UPDATE: u8 = 0x01;

/// Value written to the client command register to enter update mode.
pub const UPDATE_TRIGGER: u8 = 0xAA;

const _: () = assert!(BOOT_STATE_ADDR as usize % PAGE_SIZE == 0);
const _: () = assert!(APP_HEADER_ADDR as usize % PAGE_SIZE == 0);
const _: () = assert!(APP_CODE_ADDR == APP_HEADER_ADDR + PAGE_SIZE as u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Erase boot state, header and application code
    Erase = 0x01,
    /// Program the page buffer at the latched page address
    Write = 0x02,
    /// Compare the application CRC with the latched expected CRC
    Verify = 0x03,
    /// Hand control to the application if it validates
    Boot = 0x04,
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Command::Erase),
            0x02 => Ok(Command::Write),
            0x03 => Ok(Command::Verify),
            0x04 => Ok(Command::Boot),
            other => Err(ProtocolError::InvalidCommand(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Idle = 0x00,
    Busy = 0x01,
    Success = 0x40,
    Error = 0x80,
}

/// Wire encoding of the BL_ERROR register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCode {
    None = 0x00,
    InvalidCommand = 0x01,
    InvalidAddress = 0x02,
    FlashErase = 0x03,
    FlashWrite = 0x04,
    CrcMismatch = 0x05,
    AppInvalid = 0x06,
    Timeout = 0x07,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    InvalidCommand(u8),
    InvalidAddress,
    BadMagic,
    HeaderChecksum,
    CrcMismatch,
}

pub type Result<T> = core::result::Result<T, ProtocolError>;

impl From<ProtocolError> for ErrorCode {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidCommand(_) => ErrorCode::InvalidCommand,
            ProtocolError::InvalidAddress => ErrorCode::InvalidAddress,
            ProtocolError::BadMagic | ProtocolError::HeaderChecksum => ErrorCode::AppInvalid,
            ProtocolError::CrcMismatch => ErrorCode::CrcMismatch,
        }
    }
}

/// Absolute flash address for a write command's page offset.
///
/// Offsets are relative to the application header, so the header itself is
/// page 0. Returns `InvalidAddress` for offsets that are unaligned or that
/// run past the end of flash.
pub fn page_address(offset: u16) -> Result<u32> {
    let addr = APP_HEADER_ADDR + offset as u32;
    if addr as usize % PAGE_SIZE != 0 || addr + PAGE_SIZE as u32 > FLASH_END {
        return Err(ProtocolError::InvalidAddress);
    }
    Ok(addr)
}
