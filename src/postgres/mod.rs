// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connections, the bounded pool, and table discovery

pub mod catalog;
pub mod connection;
pub mod pool;

pub use catalog::{list_tables, PrimaryKey, TableInfo};
pub use connection::{connect, connect_with_retry};
pub use pool::{ConnectionPool, PooledConnection};
