//! Core invoice types, validation, folio numbering and tax arithmetic.
//!
//! This module has no I/O: it holds the strongly-typed CFDI invoice model
//! shared by the allocator, assembler, renderers and stamping pipeline.

mod error;
mod numbering;
mod totals;
mod types;
mod validation;

pub use error::*;
pub use numbering::*;
pub use totals::*;
pub use types::*;
pub use validation::*;
