//! Inline-menu construction and callback ids.
//!
//! One row per channel with an on/off button pair, then the Settings entry.
//! The callback ids (`ON_<i>`, `OFF_<i>`, `settings`, `password`, `logoff`,
//! `reset`) are the wire contract between menus rendered here and the
//! router's dispatch; nothing else may invent ids.

use crate::telegram::Menu;

pub const CB_SETTINGS: &str = "settings";
pub const CB_PASSWORD: &str = "password";
pub const CB_LOGOFF: &str = "logoff";
pub const CB_RESET: &str = "reset";

/// Root menu: on/off pair per channel, Settings last.
pub fn channel_menu(number_of_channels: u8) -> Menu {
    let mut menu = Menu::new();
    for i in 0..number_of_channels {
        let label = format!("{} on", i + 1);
        let id = format!("ON_{}", i);
        menu.add_button(&label, &id);

        let label = format!("{} off", i + 1);
        let id = format!("OFF_{}", i);
        menu.add_button(&label, &id);

        menu.add_row();
    }
    menu.add_button("Settings", CB_SETTINGS);
    menu
}

/// Settings submenu.
pub fn settings_menu() -> Menu {
    let mut menu = Menu::new();
    menu.add_button("Show the password for this bot", CB_PASSWORD);
    menu.add_row();
    menu.add_button("Sign out", CB_LOGOFF);
    menu.add_row();
    menu.add_button("Reset the receiver to factory settings", CB_RESET);
    menu
}

/// Decode an `ON_<i>` / `OFF_<i>` callback id into `(channel, on)`.
/// Returns `None` for anything else; bounds checking is the caller's job.
pub fn parse_channel_callback(data: &str) -> Option<(u8, bool)> {
    let (digits, on) = if let Some(rest) = data.strip_prefix("ON_") {
        (rest, true)
    } else if let Some(rest) = data.strip_prefix("OFF_") {
        (rest, false)
    } else {
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|channel| (channel, on))
}
