pub mod collector;
pub mod fetcher;
pub mod parser;
