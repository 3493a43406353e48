//! Boot decision and the resident update loop
//!
//! [`start`] runs once after reset. A valid application is handed back as a
//! [`Launch`] without any peripheral having been touched; otherwise the flash
//! driver and the bus are brought up and a [`Resident`] bootloader is
//! returned for the main loop to poll.

pub mod executor;
pub mod i2c;
pub mod latch;
pub mod validator;

pub use executor::{CommandExecutor, Executed};
pub use i2c::{BusHandler, RegisterFile, SharedRegisters};
pub use latch::CommandLatch;
pub use validator::{validate_app, PostCode};

use crate::drivers::flash::Flash;
use crate::hal::FlashController;
use crate::logger::{info, warn};
use crate::protocol::AppHeader;

/// Application that passed validation and is ready to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub entry: u32,
    pub header: AppHeader,
}

impl Launch {
    fn new(header: AppHeader) -> Self {
        Self { entry: header.entry_point, header }
    }
}

pub enum Startup<'a, C: FlashController> {
    Launch(Launch),
    Resident(Resident<'a, C>),
}

/// Decide between running the application and staying resident.
///
/// `init_bus` is called only on the resident path, after the flash driver
/// exists and before any command can arrive.
pub fn start<C, F>(ctrl: C, regs: &SharedRegisters, init_bus: F) -> Startup<'_, C>
where
    C: FlashController,
    F: FnOnce(),
{
    match validate_app(&ctrl) {
        Ok(header) => {
            info!(
                "application v{=u8}.{=u8}, {=u32} bytes",
                header.fw_ver_major, header.fw_ver_minor, header.app_size
            );
            Startup::Launch(Launch::new(header))
        }
        Err(post) => {
            warn!("staying in bootloader: {}", post);
            let flash = Flash::new(ctrl);
            if flash.boot_state().is_update_requested() {
                info!("update requested by application");
            }
            let executor = CommandExecutor::new(flash, regs);
            init_bus();
            Startup::Resident(Resident { executor, post })
        }
    }
}

pub struct Resident<'a, C: FlashController> {
    executor: CommandExecutor<'a, C>,
    post: PostCode,
}

impl<'a, C: FlashController> Resident<'a, C> {
    /// Reason the bootloader is resident, as shown on the error LED.
    pub fn post_code(&self) -> PostCode {
        self.post
    }

    pub fn executor(&self) -> &CommandExecutor<'a, C> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut CommandExecutor<'a, C> {
        &mut self.executor
    }

    /// Run any pending command. Returns the application to jump to once a
    /// Boot command has succeeded and the image validates.
    pub fn poll(&mut self) -> Option<Launch> {
        let done = self.executor.process()?;
        if !done.is_successful_boot() {
            return None;
        }

        let header = match validate_app(self.executor.flash().controller()) {
            Ok(header) => header,
            Err(post) => {
                warn!("boot refused: {}", post);
                self.post = post;
                return None;
            }
        };

        let flash = self.executor.flash_mut();
        if flash.boot_state().is_update_requested() {
            // A stale request would otherwise outlive the update it asked for
            if let Err(e) = flash.clear_boot_state() {
                warn!("could not clear boot state: {}", e);
            }
        }
        info!("booting application at {=u32:#x}", header.entry_point);
        Some(Launch::new(header))
    }
}
