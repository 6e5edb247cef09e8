pub mod bits;
pub mod convert;
pub mod hmac_utils;
pub mod transport;
