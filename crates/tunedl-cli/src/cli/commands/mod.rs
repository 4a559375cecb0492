//! CLI command handlers, one file per command.

mod add;
mod cancel;
mod generate;
mod pause;
mod remove;
mod resolve;
mod resume;
mod serve;
mod status;

pub use add::run_add;
pub use cancel::run_cancel;
pub use generate::{run_completions, run_manpage};
pub use pause::run_pause;
pub use remove::run_remove;
pub use resolve::run_resolve;
pub use resume::run_resume;
pub use serve::run_serve;
pub use status::run_status;
