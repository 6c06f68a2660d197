//! Devicegate - Device-Aware Admission Control
//!
//! This crate resolves a caller's identity from untrusted request metadata,
//! counts requests per identity in fixed windows, and decides whether each
//! request is admitted. An administrative interface can inspect and reset a
//! device's quota out of band.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod ratelimit;

pub use error::{GateError, Result};
