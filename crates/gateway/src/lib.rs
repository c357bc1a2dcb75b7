pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod governor;
pub mod managed_av;
pub mod state;
pub mod turns;
pub mod voice;

pub use state::AppState;
