pub mod filter;
pub mod window;
