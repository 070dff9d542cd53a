//! Output functions for consistent CLI formatting

use super::context::UiContext;
use super::theme::state_style;
use crate::session::SessionState;
use console::style;

#[derive(Clone, Copy)]
enum Level {
    Ok,
    Warn,
    Info,
}

impl Level {
    fn tag(self) -> console::StyledObject<&'static str> {
        match self {
            Level::Ok => style("[OK]").green(),
            Level::Warn => style("[WARN]").yellow(),
            Level::Info => style("[INFO]").cyan(),
        }
    }
}

/// One step line; `extra` is dimmed in fancy mode
fn step(ctx: &UiContext, level: Level, message: &str, extra: Option<String>) {
    if !ctx.use_fancy_output() {
        match extra {
            Some(extra) => println!("  {} {} {}", level.tag(), message, extra),
            None => println!("  {} {}", level.tag(), message),
        }
        return;
    }

    let text = match extra {
        Some(extra) => format!("{} {}", message, style(extra).dim()),
        None => message.to_string(),
    };
    let shown = match level {
        Level::Ok => cliclack::log::success(text),
        Level::Warn => cliclack::log::warning(text),
        Level::Info => cliclack::log::info(text),
    };
    shown.ok();
}

/// Session banner
pub fn intro(ctx: &UiContext, title: &str) {
    let title = style(title).cyan().bold();
    if ctx.use_fancy_output() {
        cliclack::intro(title).ok();
    } else {
        println!("{}\n", title);
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!("\n{} {}", Level::Ok.tag(), message);
    }
}

/// Boxed note; QR payloads are shown this way
pub fn note(ctx: &UiContext, title: &str, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::note(title, message).ok();
    } else {
        println!("{}: {}", style(title).bold(), message);
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Level::Ok, message, None);
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Level::Ok, message, Some(format!("({})", detail)));
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Level::Warn, message, Some(format!("- {}", hint)));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Level::Info, message, None);
}

/// Dimmed follow-up hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    let key = if ctx.use_fancy_output() {
        style(key).dim()
    } else {
        style(key)
    };
    println!("  {}: {}", key, value);
}

/// Session state, colored by health in fancy mode
pub fn key_value_state(ctx: &UiContext, key: &str, state: SessionState) {
    if ctx.use_fancy_output() {
        key_value(ctx, key, &state_style(state).apply_to(state.as_str()).to_string());
    } else {
        key_value(ctx, key, state.as_str());
    }
}
