//! I2C bootloader for the CH32V003 and the client side used by applications
//!
//! The bootloader sits in the first 3KB of flash. On reset it checks the
//! application header and code CRC; a valid image runs immediately, anything
//! else keeps the bootloader resident as an I2C slave that can erase,
//! program and verify the application area. Applications link the
//! [`client`] module to let a bus controller send them back into the
//! bootloader.
#![cfg_attr(not(test), no_std)]

pub(crate) mod logger;

pub mod bootloader;
pub mod client;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod protocol;
