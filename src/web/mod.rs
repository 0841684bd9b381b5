pub mod handlers;
pub mod render;
pub mod server;
pub mod state;
