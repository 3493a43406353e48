//! Logging macros
//!
//! With the `defmt` feature these are defmt's own macros. Without it they
//! expand to nothing beyond borrowing their arguments, so a logging-free
//! build costs no flash.

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(not(feature = "defmt"))]
#[allow(unused_macros)]
mod discard {
    macro_rules! trace {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    macro_rules! debug {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    macro_rules! info {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    macro_rules! warn_ {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    macro_rules! error {
        ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
    }

    pub(crate) use {debug, error, info, trace, warn_ as warn};
}

#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
pub(crate) use discard::{debug, error, info, trace, warn};
