// SPDX-License-Identifier: GPL-3.0-only

//! In-memory image model
//!
//! The pipeline works on 8-bit planes. Images arrive interleaved (one or three
//! samples per pixel) from whatever decoded them; [`planes`] splits them into
//! per-channel planes and reassembles the equalized result. [`conversions`]
//! bridges to the `image` crate for the command-line front end.

pub mod conversions;
pub mod planes;

pub use planes::{Channel, ChannelLayout, InterleavedImage, Plane};
