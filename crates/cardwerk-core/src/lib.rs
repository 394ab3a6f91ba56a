// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardwerk-core: types, configuration and errors shared by every Cardwerk crate.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use config::EngineConfig;
pub use error::CardwerkError;
pub use types::*;
