pub mod flash;
pub mod status_led;

pub use flash::{Flash, FlashError};
pub use status_led::{LedError, StatusLeds};
