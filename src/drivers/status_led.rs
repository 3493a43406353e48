//! Status and error LEDs
//!
//! Both LEDs are wired active-low. The status LED is solid while the
//! bootloader is resident; the error LED flashes the POST code.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::OutputPin;

use crate::bootloader::PostCode;
use crate::config::{
    POST_CYCLE_MS, POST_FLASH_ON_MS, POST_FLASH_PERIOD_MS, STARTUP_BLINKS, STARTUP_BLINK_MS, STARTUP_SETTLE_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedError<S, E> {
    Status(S),
    Error(E),
}

pub type Result<S, E> = core::result::Result<(), LedError<S, E>>;

pub struct StatusLeds<S: OutputPin, E: OutputPin> {
    status: S,
    error: E,
    // Last level driven, so the main loop only touches GPIO on changes
    status_lit: Option<bool>,
    error_lit: Option<bool>,
}

impl<S: OutputPin, E: OutputPin> StatusLeds<S, E> {
    pub fn new(status: S, error: E) -> Self {
        Self { status, error, status_lit: None, error_lit: None }
    }

    /// Alternate the two LEDs a few times, then leave both dark.
    pub fn startup_pattern<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<S::Error, E::Error> {
        for _ in 0..STARTUP_BLINKS {
            self.set_error(true)?;
            self.set_status(false)?;
            delay.delay_ms(STARTUP_BLINK_MS);
            self.set_error(false)?;
            self.set_status(true)?;
            delay.delay_ms(STARTUP_BLINK_MS);
        }
        self.all_off()?;
        delay.delay_ms(STARTUP_SETTLE_MS);
        Ok(())
    }

    /// Drive the resident pattern for the current time.
    ///
    /// The error LED gives `code` flashes at the start of every cycle and
    /// stays dark for the rest of it.
    pub fn show_post(&mut self, code: PostCode, ticks_ms: u32) -> Result<S::Error, E::Error> {
        self.set_status(true)?;

        let cycle = ticks_ms % POST_CYCLE_MS;
        let flashing = cycle < u32::from(code.flashes()) * POST_FLASH_PERIOD_MS;
        self.set_error(flashing && cycle % POST_FLASH_PERIOD_MS < POST_FLASH_ON_MS)
    }

    pub fn all_off(&mut self) -> Result<S::Error, E::Error> {
        self.set_status(false)?;
        self.set_error(false)
    }

    pub fn release(self) -> (S, E) {
        (self.status, self.error)
    }

    fn set_status(&mut self, lit: bool) -> Result<S::Error, E::Error> {
        if self.status_lit == Some(lit) {
            return Ok(());
        }
        let driven = if lit { self.status.set_low() } else { self.status.set_high() };
        driven.map_err(LedError::Status)?;
        self.status_lit = Some(lit);
        Ok(())
    }

    fn set_error(&mut self, lit: bool) -> Result<S::Error, E::Error> {
        if self.error_lit == Some(lit) {
            return Ok(());
        }
        let driven = if lit { self.error.set_low() } else { self.error.set_high() };
        driven.map_err(LedError::Error)?;
        self.error_lit = Some(lit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::delay::MockNoop;
    use embedded_hal_mock::pin::{Mock as PinMock, State, Transaction as PinTransaction};

    fn on() -> PinTransaction {
        PinTransaction::set(State::Low)
    }

    fn off() -> PinTransaction {
        PinTransaction::set(State::High)
    }

    #[test]
    fn startup_alternates_then_goes_dark() {
        let status = PinMock::new(&[off(), on(), off(), on(), off(), on(), off()]);
        let error = PinMock::new(&[on(), off(), on(), off(), on(), off()]);
        let mut leds = StatusLeds::new(status, error);

        leds.startup_pattern(&mut MockNoop::new()).unwrap();

        let (mut status, mut error) = leds.release();
        status.done();
        error.done();
    }

    #[test]
    fn invalid_header_flashes_twice_per_cycle() {
        let status = PinMock::new(&[on()]);
        let error = PinMock::new(&[on(), off(), on(), off(), on()]);
        let mut leds = StatusLeds::new(status, error);

        for ticks in [0, 100, 149, 150, 299, 300, 449, 450, 599, 600, 1999, 2000] {
            leds.show_post(PostCode::InvalidHeader, ticks).unwrap();
        }

        let (mut status, mut error) = leds.release();
        status.done();
        error.done();
    }

    #[test]
    fn missing_application_flashes_once() {
        let status = PinMock::new(&[on()]);
        let error = PinMock::new(&[on(), off()]);
        let mut leds = StatusLeds::new(status, error);

        for ticks in [2_000, 2_150, 2_300, 2_450, 2_600, 3_999] {
            leds.show_post(PostCode::NoApplication, ticks).unwrap();
        }

        let (mut status, mut error) = leds.release();
        status.done();
        error.done();
    }

    #[test]
    fn all_off_after_post_display() {
        let status = PinMock::new(&[on(), off()]);
        let error = PinMock::new(&[off()]);
        let mut leds = StatusLeds::new(status, error);

        leds.show_post(PostCode::CrcMismatch, 1_000).unwrap();
        leds.all_off().unwrap();
        leds.all_off().unwrap();

        let (mut status, mut error) = leds.release();
        status.done();
        error.done();
    }
}
