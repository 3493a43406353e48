//! Clocks, SysTick millisecond counter and CPU control

use core::arch::asm;
use core::cell::Cell;

use critical_section::Mutex;
use embedded_hal::blocking::delay::DelayMs;

use super::flash::set_latency_for_48mhz;
use super::{
    disable_irq, enable_irq, Reg, IRQ_I2C1_ER, IRQ_I2C1_EV, IRQ_SYSTICK, PFIC_CFGR, RCC_CFGR0, RCC_CTLR,
};
use crate::config::{SYSTEM_CORE_CLOCK_HZ, SYSTICK_HZ};
use crate::hal::Cpu;

const SYSTICK_BASE: usize = 0xE000_F000;
const STK_CTLR: Reg = Reg::new(SYSTICK_BASE, 0x00);
const STK_SR: Reg = Reg::new(SYSTICK_BASE, 0x04);
const STK_CNT: Reg = Reg::new(SYSTICK_BASE, 0x08);
const STK_CMP: Reg = Reg::new(SYSTICK_BASE, 0x10);

const STK_CTLR_STE: u32 = 1 << 0;
const STK_CTLR_STIE: u32 = 1 << 1;
const STK_CTLR_STCLK: u32 = 1 << 2;
const STK_CTLR_STRE: u32 = 1 << 3;

const RCC_PLLON: u32 = 1 << 24;
const RCC_PLLRDY: u32 = 1 << 25;
const CFGR0_SW_MASK: u32 = 0b11;
const CFGR0_SW_PLL: u32 = 0b10;
const CFGR0_HPRE_MASK: u32 = 0xF << 4;
const CFGR0_PLLSRC: u32 = 1 << 16;

const PFIC_KEY3: u32 = 0xBEEF_0000;
const PFIC_SYSRESET: u32 = 1 << 7;

static TICKS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

/// Run the core from HSI x2 = 48MHz, no AHB prescaler.
///
/// # Safety
///
/// Call once at reset, before anything depends on the clock.
pub unsafe fn init_clocks() {
    set_latency_for_48mhz();
    RCC_CFGR0.write(RCC_CFGR0.read() & !(CFGR0_HPRE_MASK | CFGR0_PLLSRC));
    RCC_CTLR.set_bits(RCC_PLLON);
    while RCC_CTLR.read() & RCC_PLLRDY == 0 {}

    RCC_CFGR0.write((RCC_CFGR0.read() & !CFGR0_SW_MASK) | CFGR0_SW_PLL);
    while (RCC_CFGR0.read() >> 2) & CFGR0_SW_MASK != CFGR0_SW_PLL {}
}

/// Start the 1kHz tick interrupt.
///
/// # Safety
///
/// The SysTick handler must call [`on_systick`].
pub unsafe fn init_systick() {
    STK_CTLR.write(0);
    STK_CMP.write(SYSTEM_CORE_CLOCK_HZ / SYSTICK_HZ - 1);
    STK_CNT.write(0);
    STK_SR.write(0);
    STK_CTLR.write(STK_CTLR_STE | STK_CTLR_STIE | STK_CTLR_STCLK | STK_CTLR_STRE);
    enable_irq(IRQ_SYSTICK);
}

/// Set the global interrupt enable.
///
/// # Safety
///
/// Every enabled interrupt must have its handler state in place.
pub unsafe fn enable_interrupts() {
    asm!("csrsi mstatus, 0x8");
}

/// Body of the SysTick interrupt.
pub fn on_systick() {
    STK_SR.write(0);
    critical_section::with(|cs| {
        let ticks = TICKS.borrow(cs);
        ticks.set(ticks.get().wrapping_add(1));
    });
}

/// Milliseconds since `init_systick`.
pub fn millis() -> u32 {
    critical_section::with(|cs| TICKS.borrow(cs).get())
}

/// Busy-wait delay on the tick counter. Interrupts must be enabled.
pub struct SysTickDelay;

impl DelayMs<u16> for SysTickDelay {
    fn delay_ms(&mut self, ms: u16) {
        let start = millis();
        while millis().wrapping_sub(start) <= u32::from(ms) {}
    }
}

pub struct Ch32Cpu;

impl Cpu for Ch32Cpu {
    fn jump_to_application(&mut self, entry: u32) -> ! {
        // SAFETY: clearing MIE only masks interrupts
        unsafe { asm!("csrci mstatus, 0x8") };
        STK_CTLR.write(0);
        disable_irq(IRQ_SYSTICK);
        disable_irq(IRQ_I2C1_EV);
        disable_irq(IRQ_I2C1_ER);

        // SAFETY: `entry` comes from a validated header and points at the
        // application's first instruction; nothing of ours runs afterwards
        unsafe { asm!("jr {0}", in(reg) entry, options(noreturn)) }
    }

    fn system_reset(&mut self) -> ! {
        PFIC_CFGR.write(PFIC_KEY3 | PFIC_SYSRESET);
        loop {
            core::hint::spin_loop();
        }
    }
}
