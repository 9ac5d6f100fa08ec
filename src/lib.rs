pub mod arena;
pub mod bracket;
pub mod config;
pub mod engine;
pub mod event;
pub mod game;
pub mod kit;
pub mod server;
pub mod types;

pub fn app_version() -> [usize; 3] {
    [
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or_default(),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or_default(),
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or_default(),
    ]
}
