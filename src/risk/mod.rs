// Position sizing and fee accounting
pub mod sizing;

pub use sizing::{
    capital_base, entry_fee, settle_close, size_entry, size_sniper_entry, Settlement,
    SizingRejection, FEE_RATE, MIN_ENTRY_USD, SNIPER_MIN_BALANCE,
};
