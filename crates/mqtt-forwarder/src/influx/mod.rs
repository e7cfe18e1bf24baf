// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB sink.
//!
//! ```text
//! NormalizedRecord --> LineProtocolWriter --> HTTP POST /write?db=... --> InfluxDB 1.x
//! ```

pub mod line_protocol;
pub mod store;

pub use line_protocol::LineProtocolWriter;
pub use store::InfluxStore;
