pub mod action;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod keyboard;
pub mod render;
pub mod runner;
pub mod schema;
pub mod session;
pub mod state;
pub mod stats;
pub mod telemetry;

pub type Engine = engine::SessionEngine<database::Connection>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
