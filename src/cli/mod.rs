//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Desk setup | `init` |
//! | Records | Members, items, policies | `member add`, `item show`, `policy set` |
//! | Circulation | Loans and returns | `lend`, `return`, `loans`, `refresh`, `receipt` |
//! | Notices | Reminders and overdue notices | `notices scan`, `notices deliver` |
//! | Audit | History trail | `history --member m-1` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Logs go to stderr. `--verbose` (or `-v`) turns on debug output,
//! otherwise `RUST_LOG` applies (default `warn`):
//! ```bash
//! circ --verbose lend m-1 EJ-0001
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod history;
mod items;
mod lending;
mod members;
mod notices;
mod output;
mod policies;
mod session;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
