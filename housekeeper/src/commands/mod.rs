pub mod create_update;
pub mod delete_update;
pub mod install;
pub mod list_updates;
pub mod signal;
pub mod uninstall;
