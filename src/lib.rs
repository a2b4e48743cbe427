pub mod command;
pub mod errors;
pub mod service;
pub mod workspace;
