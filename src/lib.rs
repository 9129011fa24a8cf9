pub mod config;
pub mod crawler;
pub mod error;
pub mod identity;
pub mod proxy;
pub mod random;
pub mod storage;
