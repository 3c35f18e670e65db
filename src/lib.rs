pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod namespace;
pub mod pipeline;
pub mod ratelimit;
pub mod registry;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod testing;
