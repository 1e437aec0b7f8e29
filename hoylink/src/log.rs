//! Logging shims for the four levels this crate emits.
//!
//! With the `log` cargo feature enabled, these forward to the `log` crate's macros. Without it,
//! the format string and arguments are still type-checked via `format_args!`, but nothing is
//! emitted and the whole call optimizes away.

macro_rules! trace {
    ($($t:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!($($t)*);
        #[cfg(not(feature = "log"))]
        {
            format_args!($($t)*);
        }
    }};
}

macro_rules! debug {
    ($($t:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!($($t)*);
        #[cfg(not(feature = "log"))]
        {
            format_args!($($t)*);
        }
    }};
}

macro_rules! info {
    ($($t:tt)*) => {{
        #[cfg(feature = "log")]
        log::info!($($t)*);
        #[cfg(not(feature = "log"))]
        {
            format_args!($($t)*);
        }
    }};
}

macro_rules! warn {
    ($($t:tt)*) => {{
        #[cfg(feature = "log")]
        log::warn!($($t)*);
        #[cfg(not(feature = "log"))]
        {
            format_args!($($t)*);
        }
    }};
}
