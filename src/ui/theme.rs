//! Colors for cliclack prompts and session states

use crate::session::SessionState;
use cliclack::ThemeState;
use console::Style;

/// sessiond's theme: cyan while active, green on submit
#[derive(Debug, Clone, Default)]
pub struct SessiondTheme;

impl cliclack::Theme for SessiondTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().cyan().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green(),
        }
    }
}

/// Initialize the global theme
pub fn init_theme() {
    cliclack::set_theme(SessiondTheme);
}

/// Color for a session state in tables and status lines
pub fn state_style(state: SessionState) -> Style {
    match state {
        SessionState::Connected => Style::new().green(),
        SessionState::Connecting | SessionState::AwaitingQrScan => Style::new().yellow(),
        SessionState::Disconnected => Style::new().red(),
        SessionState::Idle | SessionState::LoggedOut => Style::new().dim(),
    }
}

/// True for states a caller waiting on a session should stop at
pub fn is_settled(state: SessionState) -> bool {
    matches!(state, SessionState::Connected | SessionState::LoggedOut)
}
