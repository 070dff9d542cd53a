//! Live view of a session while waiting for it to settle

use super::context::UiContext;
use super::theme::state_style;
use crate::session::{SessionSnapshot, SessionState};
use console::style;

/// Spinner that follows a tenant's state, printing each new QR code
pub struct StateSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
    last_state: Option<SessionState>,
    last_qr: Option<String>,
}

impl StateSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
            last_state: None,
            last_qr: None,
        }
    }

    /// Show a polled snapshot; repeated snapshots print nothing
    pub fn update(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.last_qr_payload.is_some() && snapshot.last_qr_payload != self.last_qr {
            self.last_qr = snapshot.last_qr_payload.clone();
            self.show_qr(snapshot);
        }

        if self.last_state == Some(snapshot.state) {
            return;
        }
        self.last_state = Some(snapshot.state);

        let message = format!("{}: {}", snapshot.tenant_id, snapshot.state.as_str());
        if self.interactive {
            let message = format!(
                "{}: {}",
                snapshot.tenant_id,
                state_style(snapshot.state).apply_to(snapshot.state.as_str())
            );
            match &self.spinner {
                Some(spinner) => spinner.start(message),
                None => {
                    let spinner = cliclack::spinner();
                    spinner.start(message);
                    self.spinner = Some(spinner);
                }
            }
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    fn show_qr(&mut self, snapshot: &SessionSnapshot) {
        let Some(qr) = &snapshot.last_qr_payload else {
            return;
        };

        if let Some(spinner) = self.spinner.take() {
            spinner.stop("QR code issued");
            // Restart the spinner on the next state print
            self.last_state = None;
        }
        if self.interactive {
            cliclack::note("Scan with the messaging app", qr).ok();
        } else {
            println!("QR: {}", qr);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}
