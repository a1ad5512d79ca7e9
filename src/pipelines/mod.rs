// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────────┐     ┌──────────────┐
//! │ Decoded image│ ──▶ │  Equalize pipeline     │ ──▶ │ Output image │
//! │ (L8 / RGB8)  │     │  - histogram (atomic)  │     │ + reports    │
//! │              │     │  - prefix scan         │     │              │
//! │              │     │  - normalize / apply   │     │              │
//! └──────────────┘     └────────────────────────┘     └──────────────┘
//! ```
//!
//! Stages are written against [`crate::backends::ComputeBackend`] and run
//! unchanged on the GPU and CPU backends.

pub mod equalize;

pub use equalize::{EqualizeOptions, EqualizedImage, Equalizer};
