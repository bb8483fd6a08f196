// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

mod profile;
pub mod reader;

pub use profile::{Mode, Profiler, WayProfile};
