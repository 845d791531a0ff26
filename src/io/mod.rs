pub mod config_io;
pub mod lock;
pub mod persistence;
pub mod recovery;
pub mod storage;
pub mod watcher;
