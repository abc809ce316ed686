//! `turntable-memory` – participant history.
//!
//! Keeps the cumulative record of which models a participant has already
//! been shown, utilizing a local SQLite substrate.
//!
//! # Modules
//!
//! - [`seen`] – [`SeenStore`][seen::SeenStore]: append-only history of shown
//!   model identifiers.  Opened in memory it lives as long as the page/process;
//!   opened on a file it survives restarts, so a returning participant never
//!   sees the same model twice.

pub mod seen;

pub use seen::{SeenEntry, SeenStore, SeenStoreError};
