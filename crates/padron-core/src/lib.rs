#![deny(missing_docs)]

//! # padron-core -- Foundational Types for the Padron Lookup Stack
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies and performs no I/O.
//!
//! ## Design Principles
//!
//! 1. **Validated newtypes.** A [`Cuit`] can only be constructed through the
//!    mod-11 checksum, so any function accepting `&Cuit` never re-validates.
//!
//! 2. **Closed vocabularies.** [`DocType`] and [`IvaCondition`] are enums.
//!    Raw provider strings are mapped through [`normalize_fiscal_status`],
//!    which returns `None` rather than guessing.
//!
//! 3. **[`ValidationError`] hierarchy.** Structured errors with `thiserror`,
//!    carrying the rejected input.

pub mod cuit;
pub mod error;
pub mod fiscal;

pub use cuit::{classify, is_valid, normalize, Cuit, DocType};
pub use error::ValidationError;
pub use fiscal::{normalize_fiscal_status, IvaCondition};
