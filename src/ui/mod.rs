//! UI module for consistent CLI output
//!
//! Uses `cliclack` for prompts and spinners with automatic fallback to
//! plain output in CI/non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use sessiond::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::intro(&ctx, "Session acme");
//! ui::key_value_state(&ctx, "State", snapshot.state);
//!
//! if ui::confirm(&ctx, "Wipe stored credentials?", false).await? {
//!     // ...
//! }
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_state, note, outro_success, remark, step_info, step_ok,
    step_ok_detail, step_warn_hint,
};
pub use progress::StateSpinner;
pub use prompts::confirm;
pub use theme::{init_theme, is_settled, state_style, SessiondTheme};
