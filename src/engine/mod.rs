pub mod config;
pub mod item;
pub mod runner;
pub mod session;
pub mod snake;
pub mod spawner;
