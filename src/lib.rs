/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

pub mod config;
pub mod engine;
pub mod ensight;
pub mod fil;
pub mod model;
pub mod run;

/// Prelude module to import everything from this crate
pub mod prelude {
    pub use crate::config::*;
    pub use crate::engine::*;
    pub use crate::ensight::prelude::*;
    pub use crate::fil::*;
    pub use crate::model::*;
    pub use crate::run::*;
}
