//! Infrastructure adapters. Implement outbound ports and the HTTP surface.
//!
//! Providers, persistence, mail, transport. Map errors to DomainError.

pub mod email;
pub mod http;
pub mod persistence;
pub mod providers;
