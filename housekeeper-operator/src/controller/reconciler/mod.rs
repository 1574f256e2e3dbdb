pub mod context;
pub mod error;
pub mod state;
pub mod update;
