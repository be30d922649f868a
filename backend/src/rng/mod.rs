//! Deterministic random number generation
//!
//! Uses xorshift64* algorithm for fast, deterministic random number generation.
//! CRITICAL: All randomness in the simulator MUST go through this module.
//! Strategy draws and commitment sampling both consume from the same
//! generator, so the call order inside a tick is part of the replay contract.

mod xorshift;

pub use xorshift::RngManager;
