// Symbol discovery: which pairs the cycle scans
pub mod universe;

pub use universe::{build_universe, exclusion_reason, select_universe, with_open_symbols, TOP_PAIRS};
