//! CH32V003 implementations of the hal traits
//!
//! Plain volatile accesses at the addresses from the reference manual.
//! Only the handful of registers the bootloader needs are described.

pub mod flash;
pub mod gpio;
pub mod i2c;
pub mod system;

pub use flash::Ch32Flash;
pub use gpio::{error_led, status_led, LedPin};
pub use i2c::Ch32I2c;
pub use system::{Ch32Cpu, SysTickDelay};

pub(crate) const RCC_BASE: usize = 0x4002_1000;
pub(crate) const RCC_CTLR: Reg = Reg::new(RCC_BASE, 0x00);
pub(crate) const RCC_CFGR0: Reg = Reg::new(RCC_BASE, 0x04);
pub(crate) const RCC_APB2PCENR: Reg = Reg::new(RCC_BASE, 0x18);
pub(crate) const RCC_APB1PCENR: Reg = Reg::new(RCC_BASE, 0x1C);

pub(crate) const PFIC_BASE: usize = 0xE000_E000;
/// Interrupt enable set, IRQs 0..=31
pub(crate) const PFIC_IENR1: Reg = Reg::new(PFIC_BASE, 0x100);
/// Interrupt enable clear, IRQs 0..=31
pub(crate) const PFIC_IRER1: Reg = Reg::new(PFIC_BASE, 0x180);
pub(crate) const PFIC_CFGR: Reg = Reg::new(PFIC_BASE, 0x48);

pub(crate) const IRQ_SYSTICK: u32 = 12;
pub(crate) const IRQ_I2C1_EV: u32 = 30;
pub(crate) const IRQ_I2C1_ER: u32 = 31;

/// One memory-mapped peripheral register.
#[derive(Clone, Copy)]
pub(crate) struct Reg(usize);

impl Reg {
    pub(crate) const fn new(base: usize, offset: usize) -> Self {
        Self(base + offset)
    }

    #[inline]
    pub(crate) fn read(self) -> u32 {
        // SAFETY: only constructed for fixed peripheral addresses on this chip
        unsafe { core::ptr::read_volatile(self.0 as *const u32) }
    }

    #[inline]
    pub(crate) fn write(self, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(self.0 as *mut u32, value) }
    }

    /// 16-bit access for the I2C block, whose registers are halfword wide.
    #[inline]
    pub(crate) fn read16(self) -> u16 {
        // SAFETY: as above
        unsafe { core::ptr::read_volatile(self.0 as *const u16) }
    }

    #[inline]
    pub(crate) fn write16(self, value: u16) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(self.0 as *mut u16, value) }
    }

    #[inline]
    pub(crate) fn set_bits(self, mask: u32) {
        self.write(self.read() | mask);
    }

    #[inline]
    pub(crate) fn clear_bits(self, mask: u32) {
        self.write(self.read() & !mask);
    }
}

pub(crate) fn enable_irq(irq: u32) {
    PFIC_IENR1.write(1 << irq);
}

pub(crate) fn disable_irq(irq: u32) {
    PFIC_IRER1.write(1 << irq);
}
