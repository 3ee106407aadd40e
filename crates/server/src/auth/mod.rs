// Request authentication: operator Basic auth and webhook signatures.

pub mod basic;
pub mod signature;
