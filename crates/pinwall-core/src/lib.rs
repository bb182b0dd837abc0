pub mod access;
pub mod cache;
pub mod codes;
pub mod error;
pub mod membership;
pub mod ratelimit;
pub mod store;

mod rowmap;
