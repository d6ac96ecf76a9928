
pub mod config;
pub mod constants;
pub mod clock;
pub mod telegram;
pub mod interp;
pub mod stream;
pub mod registry;
pub mod sampler;
pub mod bridge;
pub mod ownship;
pub mod net;
