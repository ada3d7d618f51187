mod create;
mod env;
mod lifecycle;
mod list;
mod remove;

pub use create::run_create;
pub use env::run_env;
pub use lifecycle::{run_start, run_stop};
pub use list::run_list;
pub use remove::run_remove;
