pub mod config;
pub mod ipc;
pub mod radio;
pub mod timer;
