//! Terminal output for crac
//!
//! Uses `cliclack` spinners and log lines when attached to a terminal, with
//! plain `[OK]`-style lines in CI. All progress goes to stderr.
//!
//! ```rust,ignore
//! use crac::ui::{self, TaskSpinner, UiContext};
//!
//! let ctx = UiContext::detect().with_quiet(cli.quiet);
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Pushing cache...");
//! spinner.stop("Pushed");
//! ui::key_value(&ctx, "tag", "1a2b3c4d");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, step_info, step_ok, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
