//! Order book access: lender asks, borrower bids and the offers pairing them

mod engine;

pub use engine::OrderMatcher;
