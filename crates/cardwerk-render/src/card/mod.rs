// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card module: layout table, template layers, text faces and the face renderer.

pub mod assets;
pub mod layout;
pub mod renderer;
pub mod text;

pub use assets::{TemplateAssets, TemplateLayer};
pub use layout::{CardField, CardLayout, Placement};
pub use renderer::{CardRenderer, encode_png};
pub use text::TextFace;
