mod connection;
pub mod model;
pub mod ops;

pub use connection::create_sqlite_connection;
