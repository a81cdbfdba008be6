pub mod cli;
pub mod commands;
pub mod http;
pub mod output;
pub mod store;
