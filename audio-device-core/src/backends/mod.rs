//! Software backends that need no audio hardware.

pub mod loopback;
pub mod null;
