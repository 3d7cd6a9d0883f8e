//! Concrete source adapters.
//!
//! Each adapter implements one of the production manager's capability
//! traits; site-specific parsing stays inside its own module.

pub mod pairs_file;
pub mod tatoeba;

pub use pairs_file::PairsFileSource;
pub use tatoeba::TatoebaSource;
