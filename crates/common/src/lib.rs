//! Common utilities shared by the authentication session crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (structural decode, size and clock-skew limits)
pub mod jwt;
