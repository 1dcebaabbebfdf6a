pub mod memory;
pub mod postgres;
pub mod transaction_manager;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use transaction_manager::{ManagedTransaction, TransactionManager, TransactionScope};
