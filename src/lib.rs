pub mod app;
pub mod bruteforcer;
pub mod cli;
pub mod config;
pub mod detector;
pub mod output;
pub mod pool;
pub mod recursion;
pub mod runner;
pub mod state;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
