//! Register map
//!
//! The bus exposes 256 byte-wide registers. They fall into three ranges,
//! each decoded into its own enum; anything else is `Register::Unhandled`.

pub const REG_HW_TYPE: u8 = 0x00;
pub const REG_FW_VER_MAJOR: u8 = 0x01;
pub const REG_FW_VER_MINOR: u8 = 0x02;

pub const REG_APP_BL_VERSION: u8 = 0xE0;
pub const REG_APP_UPDATE_CMD: u8 = 0xE1;
pub const REG_APP_UPDATE_SIZE_L: u8 = 0xE2;
pub const REG_APP_UPDATE_SIZE_H: u8 = 0xE3;
pub const REG_APP_UPDATE_CRC_0: u8 = 0xE4;
pub const REG_APP_UPDATE_CRC_3: u8 = 0xE7;

pub const REG_BL_VERSION: u8 = 0xF0;
pub const REG_BL_STATUS: u8 = 0xF1;
pub const REG_BL_ERROR: u8 = 0xF2;
pub const REG_BL_RESERVED_F3: u8 = 0xF3;
pub const REG_BL_RESERVED_F7: u8 = 0xF7;
pub const REG_BL_CMD: u8 = 0xF8;
pub const REG_BL_ADDR_L: u8 = 0xF9;
pub const REG_BL_ADDR_H: u8 = 0xFA;
pub const REG_BL_DATA: u8 = 0xFB;
pub const REG_BL_CRC_0: u8 = 0xFC;
pub const REG_BL_CRC_3: u8 = 0xFF;

/// 0x00-0x0F, served in both bootloader and application mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommonRegister {
    HwType,
    FwVersionMajor,
    FwVersionMinor,
}

/// 0xE0-0xE7, served by the update client inside the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientRegister {
    BootloaderVersion,
    UpdateCommand,
    /// Byte lane of the little-endian expected size, 0..=1
    UpdateSize(u8),
    /// Byte lane of the little-endian expected CRC, 0..=3
    UpdateCrc(u8),
}

/// 0xF0-0xFF, only present while the bootloader is resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootloaderRegister {
    ProtocolVersion,
    Status,
    Error,
    Reserved(u8),
    Command,
    /// Byte lane of the little-endian page offset, 0..=1
    PageAddress(u8),
    PageData,
    /// Byte lane of the little-endian expected CRC, 0..=3
    ExpectedCrc(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    Common(CommonRegister),
    Client(ClientRegister),
    Bootloader(BootloaderRegister),
    Unhandled(u8),
}

impl From<u8> for Register {
    fn from(addr: u8) -> Self {
        match addr {
            REG_HW_TYPE => Register::Common(CommonRegister::HwType),
            REG_FW_VER_MAJOR => Register::Common(CommonRegister::FwVersionMajor),
            REG_FW_VER_MINOR => Register::Common(CommonRegister::FwVersionMinor),

            REG_APP_BL_VERSION => Register::Client(ClientRegister::BootloaderVersion),
            REG_APP_UPDATE_CMD => Register::Client(ClientRegister::UpdateCommand),
            REG_APP_UPDATE_SIZE_L..=REG_APP_UPDATE_SIZE_H => {
                Register::Client(ClientRegister::UpdateSize(addr - REG_APP_UPDATE_SIZE_L))
            }
            REG_APP_UPDATE_CRC_0..=REG_APP_UPDATE_CRC_3 => {
                Register::Client(ClientRegister::UpdateCrc(addr - REG_APP_UPDATE_CRC_0))
            }

            REG_BL_VERSION => Register::Bootloader(BootloaderRegister::ProtocolVersion),
            REG_BL_STATUS => Register::Bootloader(BootloaderRegister::Status),
            REG_BL_ERROR => Register::Bootloader(BootloaderRegister::Error),
            REG_BL_RESERVED_F3..=REG_BL_RESERVED_F7 => {
                Register::Bootloader(BootloaderRegister::Reserved(addr))
            }
            REG_BL_CMD => Register::Bootloader(BootloaderRegister::Command),
            REG_BL_ADDR_L..=REG_BL_ADDR_H => {
                Register::Bootloader(BootloaderRegister::PageAddress(addr - REG_BL_ADDR_L))
            }
            REG_BL_DATA => Register::Bootloader(BootloaderRegister::PageData),
            REG_BL_CRC_0..=REG_BL_CRC_3 => {
                Register::Bootloader(BootloaderRegister::ExpectedCrc(addr - REG_BL_CRC_0))
            }

            other => Register::Unhandled(other),
        }
    }
}

impl Register {
    /// Whether a burst keeps the cursor here instead of advancing.
    ///
    /// The page-data window is a single address that streams 64 bytes.
    pub fn is_window(self) -> bool {
        matches!(self, Register::Bootloader(BootloaderRegister::PageData))
    }
}

/// Byte `lane` of a little-endian value.
pub fn byte_lane(value: u32, lane: u8) -> u8 {
    (value >> (8 * lane as u32)) as u8
}

/// Replace byte `lane` of a little-endian 32-bit field.
pub fn set_lane_u32(field: u32, lane: u8, byte: u8) -> u32 {
    let shift = 8 * lane as u32;
    (field & !(0xFF << shift)) | ((byte as u32) << shift)
}

/// Replace byte `lane` of a little-endian 16-bit field.
pub fn set_lane_u16(field: u16, lane: u8, byte: u8) -> u16 {
    let shift = 8 * lane as u16;
    (field & !(0xFF << shift)) | ((byte as u16) << shift)
}
