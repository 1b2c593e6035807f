//! Logging shims.
//!
//! With the `log` feature enabled, these macros forward to the `log` crate under the `bass`
//! target, so BASS output can be filtered apart from the rest of the host stack. Without the
//! feature, the arguments are still type-checked but nothing is emitted.

#[cfg(feature = "log")]
macro_rules! bass_log {
    ($lvl:ident, $($t:tt)*) => {{ ::log::log!(target: "bass", ::log::Level::$lvl, $($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! bass_log {
    ($lvl:ident, $($t:tt)*) => {{ format_args!($($t)*); }};
}

macro_rules! error {
    ($($t:tt)*) => { bass_log!(Error, $($t)*) };
}

macro_rules! warn {
    ($($t:tt)*) => { bass_log!(Warn, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { bass_log!(Info, $($t)*) };
}

macro_rules! debug {
    ($($t:tt)*) => { bass_log!(Debug, $($t)*) };
}

#[allow(unused_macros)]
macro_rules! trace {
    ($($t:tt)*) => { bass_log!(Trace, $($t)*) };
}
