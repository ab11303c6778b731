pub mod connection;
pub mod records;

pub use connection::{Connection, Store};
