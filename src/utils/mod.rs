//! Utility modules for servicetree
//!
//! This module contains utility types used throughout the library.

pub mod cancel;

pub use cancel::CancelHandle;
