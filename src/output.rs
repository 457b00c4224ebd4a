//! Terminal output.

pub mod table;

pub use table::print_status;
