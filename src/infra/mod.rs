pub mod cache;
pub mod db;
pub mod identity;
pub mod memory;
pub mod storage;
pub mod store;
