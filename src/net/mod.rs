// Network layer module
// Provides the websocket relay client

pub mod transport;

pub use transport::Transport;
