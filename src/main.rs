#![no_std]
#![no_main]

use core::cell::RefCell;

use ch32_metapac as _;
use critical_section::Mutex;
use embedded_hal::blocking::delay::DelayMs;
use panic_halt as _;
use qingke as _;

use i2c_bootloader::bootloader::{self, BusHandler, SharedRegisters, Startup};
use i2c_bootloader::config::JUMP_SETTLE_MS;
use i2c_bootloader::drivers::StatusLeds;
use i2c_bootloader::hal::ch32v003::{self as chip, system, Ch32Cpu, Ch32Flash, Ch32I2c, SysTickDelay};
use i2c_bootloader::hal::Cpu;
use i2c_bootloader::protocol::I2C_ADDRESS;

// Shared between the I2C interrupts and the main loop
static REGISTERS: SharedRegisters = SharedRegisters::new();
static BUS: Mutex<RefCell<Option<(BusHandler<'static>, Ch32I2c)>>> = Mutex::new(RefCell::new(None));

#[qingke_rt::entry]
fn main() -> ! {
    // SAFETY: first thing after reset, nothing else is running
    unsafe {
        system::init_clocks();
        system::init_systick();
        system::enable_interrupts();
    }

    let mut delay = SysTickDelay;
    let mut cpu = Ch32Cpu;
    let mut leds = StatusLeds::new(chip::status_led(), chip::error_led());
    leds.startup_pattern(&mut delay).ok();

    // SAFETY: the bootloader is the only user of the FLASH block
    let flash = unsafe { Ch32Flash::steal() };

    let startup = bootloader::start(flash, &REGISTERS, || {
        critical_section::with(|cs| {
            // SAFETY: the handler is installed before the critical section
            // ends, so no I2C interrupt can see an empty slot
            let i2c = unsafe { Ch32I2c::init(I2C_ADDRESS) };
            BUS.borrow_ref_mut(cs).replace((BusHandler::new(&REGISTERS), i2c));
        });
    });

    let mut resident = match startup {
        Startup::Launch(launch) => {
            leds.all_off().ok();
            cpu.jump_to_application(launch.entry)
        }
        Startup::Resident(resident) => resident,
    };

    loop {
        if let Some(launch) = resident.poll() {
            // Let the controller finish reading the Boot status
            delay.delay_ms(JUMP_SETTLE_MS);
            leds.all_off().ok();
            cpu.jump_to_application(launch.entry);
        }
        leds.show_post(resident.post_code(), system::millis()).ok();
    }
}

#[qingke_rt::interrupt]
fn I2C1_EV() {
    critical_section::with(|cs| {
        if let Some((handler, bus)) = BUS.borrow_ref_mut(cs).as_mut() {
            handler.on_event(bus);
        }
    });
}

#[qingke_rt::interrupt]
fn I2C1_ER() {
    critical_section::with(|cs| {
        if let Some((handler, bus)) = BUS.borrow_ref_mut(cs).as_mut() {
            handler.on_error(bus);
        }
    });
}

#[qingke_rt::interrupt(core)]
fn SysTick() {
    system::on_systick();
}
