//! I2C1 in slave mode on PC1 (SDA) / PC2 (SCL)

use super::gpio::{configure, PinConfig, GPIOC};
use super::{enable_irq, Reg, IRQ_I2C1_ER, IRQ_I2C1_EV, RCC_APB1PCENR, RCC_APB2PCENR};
use crate::config::{I2C_SPEED_HZ, SYSTEM_CORE_CLOCK_HZ};
use crate::hal::{BusEvents, BusFaults, I2cSlave};

const I2C1_BASE: usize = 0x4000_5400;
const CTLR1: Reg = Reg::new(I2C1_BASE, 0x00);
const CTLR2: Reg = Reg::new(I2C1_BASE, 0x04);
const OADDR1: Reg = Reg::new(I2C1_BASE, 0x08);
const DATAR: Reg = Reg::new(I2C1_BASE, 0x10);
const STAR1: Reg = Reg::new(I2C1_BASE, 0x14);
const STAR2: Reg = Reg::new(I2C1_BASE, 0x18);
const CKCFGR: Reg = Reg::new(I2C1_BASE, 0x1C);

const CTLR1_PE: u16 = 1 << 0;
const CTLR1_ACK: u16 = 1 << 10;

const CTLR2_ITERREN: u16 = 1 << 8;
const CTLR2_ITEVTEN: u16 = 1 << 9;
const CTLR2_ITBUFEN: u16 = 1 << 10;

const STAR1_ADDR: u16 = 1 << 1;
const STAR1_STOPF: u16 = 1 << 4;
const STAR1_RXNE: u16 = 1 << 6;
const STAR1_TXE: u16 = 1 << 7;
const STAR1_BERR: u16 = 1 << 8;
const STAR1_ARLO: u16 = 1 << 9;
const STAR1_AF: u16 = 1 << 10;
const STAR1_OVR: u16 = 1 << 11;

const STAR2_TRA: u16 = 1 << 2;

const RCC_IOPCEN: u32 = 1 << 4;
const RCC_I2C1EN: u32 = 1 << 21;

/// I2C1 peripheral handle for the interrupt handlers.
pub struct Ch32I2c {
    _private: (),
}

impl Ch32I2c {
    /// Bring up I2C1 as a slave at `address` with event, buffer and error
    /// interrupts enabled.
    ///
    /// # Safety
    ///
    /// Must be called once, before the I2C interrupts can fire, and no other
    /// code may use I2C1 or PC1/PC2.
    pub unsafe fn init(address: u8) -> Self {
        RCC_APB2PCENR.set_bits(RCC_IOPCEN);
        RCC_APB1PCENR.set_bits(RCC_I2C1EN);
        configure(GPIOC, 1, PinConfig::AlternateOpenDrain);
        configure(GPIOC, 2, PinConfig::AlternateOpenDrain);

        let freq_mhz = (SYSTEM_CORE_CLOCK_HZ / 1_000_000) as u16;
        CTLR1.write16(0);
        CTLR2.write16(freq_mhz & 0x3F);
        OADDR1.write16(u16::from(address) << 1);
        CKCFGR.write16((SYSTEM_CORE_CLOCK_HZ / (2 * I2C_SPEED_HZ)) as u16);

        CTLR2.write16(CTLR2.read16() | CTLR2_ITEVTEN | CTLR2_ITBUFEN | CTLR2_ITERREN);
        CTLR1.write16(CTLR1.read16() | CTLR1_PE);
        CTLR1.write16(CTLR1.read16() | CTLR1_ACK);

        enable_irq(IRQ_I2C1_EV);
        enable_irq(IRQ_I2C1_ER);

        Self { _private: () }
    }
}

impl I2cSlave for Ch32I2c {
    fn events(&mut self) -> BusEvents {
        let star1 = STAR1.read16();
        let address_matched = star1 & STAR1_ADDR != 0;
        // STAR1 then STAR2 clears ADDR
        let transmitting = address_matched && STAR2.read16() & STAR2_TRA != 0;

        BusEvents {
            address_matched,
            transmitting,
            byte_received: star1 & STAR1_RXNE != 0,
            transmit_empty: star1 & STAR1_TXE != 0,
            stop: star1 & STAR1_STOPF != 0,
        }
    }

    fn read_byte(&mut self) -> u8 {
        DATAR.read16() as u8
    }

    fn write_byte(&mut self, byte: u8) {
        DATAR.write16(u16::from(byte));
    }

    fn clear_stop(&mut self) {
        // STOPF clears on a CTLR1 write following the STAR1 read
        CTLR1.write16(CTLR1.read16() | CTLR1_PE);
    }

    fn faults(&mut self) -> BusFaults {
        let star1 = STAR1.read16();
        BusFaults {
            bus_error: star1 & STAR1_BERR != 0,
            arbitration_lost: star1 & STAR1_ARLO != 0,
            ack_failure: star1 & STAR1_AF != 0,
            overrun: star1 & STAR1_OVR != 0,
        }
    }

    fn clear_faults(&mut self, faults: BusFaults) {
        let mut mask = 0;
        if faults.bus_error {
            mask |= STAR1_BERR;
        }
        if faults.arbitration_lost {
            mask |= STAR1_ARLO;
        }
        if faults.ack_failure {
            mask |= STAR1_AF;
        }
        if faults.overrun {
            mask |= STAR1_OVR;
        }
        STAR1.write16(STAR1.read16() & !mask);
    }
}
