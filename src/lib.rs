// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_inception)]
#![allow(clippy::bool_assert_comparison)]
#![allow(clippy::new_without_default)]

pub mod attack;
pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod qpack;
pub mod report;
pub mod request;
pub mod response;
pub mod splitter;
pub mod transport;
pub mod varint;

pub use attack::{AttackOrchestrator, AttackOutcome, AttackPlan};
pub use error::{RaceError, RaceResult};
pub use request::{Request, RequestFramer};
pub use response::{Response, ResponseReader};
