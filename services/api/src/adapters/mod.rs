pub mod db;
pub mod google;
pub mod memory;

pub use db::DbAdapter;
pub use google::GoogleProvider;
pub use memory::InMemoryStore;
