//! Logging macros, brought into textual scope by `#[macro_use]` on this module.
//! Forwards to `tracing` when the `tracing` feature is on, and expands to nothing otherwise.

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($t: tt)*) => {
        ::tracing::debug!($($t)*)
    };
}

#[cfg(feature = "tracing")]
macro_rules! info {
    ($($t: tt)*) => {
        ::tracing::info!($($t)*)
    };
}

#[cfg(feature = "tracing")]
macro_rules! warn {
    ($($t: tt)*) => {
        ::tracing::warn!($($t)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($t: tt)*) => {};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_in_statement_position() {
        let frame = [0x00u8, 0xB0];

        debug!("TX: {:02X?}", frame);
        info!("{} tag detected", "IsoDep");
        warn!("Error closing tag: {}", "tag was lost");

        let logged = match frame.first() {
            Some(&0x00) => {
                debug!("status ok");
                true
            }
            _ => false,
        };

        assert!(logged);
    }

    #[cfg(not(feature = "tracing"))]
    #[test]
    #[allow(unused_variables)]
    fn test_arguments_are_not_evaluated_without_tracing() {
        let calls = std::cell::Cell::new(0);
        let encode = || {
            calls.set(calls.get() + 1);
            "00b0"
        };

        debug!("TX: {}", encode());
        warn!("RX: {}", encode());

        assert_eq!(0, calls.get());
    }
}
