//! GPIO configuration and the two LED pins

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;

use super::{Reg, RCC_APB2PCENR};

pub(crate) const GPIOA: usize = 0x4001_0800;
pub(crate) const GPIOC: usize = 0x4001_1000;
pub(crate) const GPIOD: usize = 0x4001_1400;

const CFGLR: usize = 0x00;
const BSHR: usize = 0x10;
const BCR: usize = 0x14;

#[derive(Clone, Copy)]
#[repr(u32)]
pub(crate) enum PinConfig {
    /// 10MHz push-pull output
    PushPull = 0b0001,
    /// 10MHz open-drain, alternate function
    AlternateOpenDrain = 0b1101,
}

pub(crate) fn configure(port: usize, pin: u8, config: PinConfig) {
    let cfglr = Reg::new(port, CFGLR);
    let shift = 4 * u32::from(pin);
    cfglr.write((cfglr.read() & !(0xF << shift)) | ((config as u32) << shift));
}

fn port_clock_bit(port: usize) -> u32 {
    match port {
        GPIOA => 1 << 2,
        GPIOC => 1 << 4,
        _ => 1 << 5,
    }
}

/// Push-pull output pin. LEDs on this board are active low.
pub struct LedPin {
    port: usize,
    mask: u32,
}

impl LedPin {
    /// Clock the port, make `pin` an output and drive it high (LED off).
    fn push_pull(port: usize, pin: u8) -> Self {
        RCC_APB2PCENR.set_bits(port_clock_bit(port));
        // Output latch first so the pin never drives low
        Reg::new(port, BSHR).write(1 << pin);
        configure(port, pin, PinConfig::PushPull);
        Self { port, mask: 1 << pin }
    }
}

impl OutputPin for LedPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Reg::new(self.port, BCR).write(self.mask);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Reg::new(self.port, BSHR).write(self.mask);
        Ok(())
    }
}

/// Status LED on PD6.
pub fn status_led() -> LedPin {
    LedPin::push_pull(GPIOD, 6)
}

/// Error LED on PA2.
pub fn error_led() -> LedPin {
    LedPin::push_pull(GPIOA, 2)
}
