//! Core domain types for the tfmirror provider mirror.
//!
//! This crate holds everything the storage and server crates share:
//! - Provider identity (registry/namespace/provider/version/os/arch) with
//!   validation and cache-key derivation
//! - SHA-256 digest type used for archive verification
//! - Application configuration types

pub mod config;
pub mod digest;
pub mod error;
pub mod provider;

pub use config::{Config, StorageType};
pub use digest::Sha256Digest;
pub use error::{Error, Result};
pub use provider::ProviderArchive;
