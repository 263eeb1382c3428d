//! A [`Frontend`] for the firmware text console.
//!
//! The main menu is drawn as a list with the OS entries first and the tools below them. Entries are picked with
//! the arrow keys and Enter, or directly through their shortcut. Insert, F2 or Tab opens the submenu of an entry.
//! The timeout counts down once per second until any key is pressed.

use alloc::{format, string::String};
use core::fmt::Write;

use log::error;
use refit_rs_core::{
    app::{Frontend, MenuChoice},
    entry::{Action, EntryKind, Menu, MenuEntry, MenuScreen, Row},
    system::{
        console::{Console, UefiConsole},
        helper::locate_protocol,
    },
};
use smallvec::SmallVec;
use thiserror::Error;
use uefi::{
    Event,
    boot::{self, EventType, ScopedProtocol, TimerTrigger, Tpl},
    proto::console::text::{Color, Input, Key, ScanCode},
    system::with_stdout,
};

/// The timeout timer interval, in 100 ns units.
const TIMER_INTERVAL: u64 = 10_000_000; // 1 second

/// The title bar of the main menu.
const MAIN_TITLE: &str = "refit-rs";

/// Key hints below the main menu.
const MAIN_HINTS: [&str; 2] = [
    "Use arrow keys to move cursor; Enter to boot; Insert, F2 or Tab for options;",
    "Esc to rescan for boot loaders",
];

/// An `Error` that may result from setting up the frontend.
#[derive(Error, Debug)]
pub enum FrontendError {
    /// There is no console input.
    #[error("No console input: {0}")]
    NoInput(uefi::Error),

    /// The timeout timer could not be created.
    #[error("Could not create the timeout timer: {0}")]
    Timer(uefi::Error),
}

/// What a key press asks a menu to do.
enum MenuKey {
    /// Move the cursor by an offset.
    Move(isize),

    /// Move the cursor to the first entry.
    First,

    /// Move the cursor to the last entry.
    Last,

    /// Run the entry under the cursor.
    Select,

    /// Open the submenu of the entry under the cursor.
    Options,

    /// Leave the menu.
    Escape,

    /// Run the entry with this shortcut.
    Shortcut(char),
}

impl MenuKey {
    /// Translates a key press.
    fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Special(ScanCode::UP) => Some(Self::Move(-1)),
            Key::Special(ScanCode::DOWN) => Some(Self::Move(1)),
            Key::Special(ScanCode::PAGE_UP) => Some(Self::Move(-10)),
            Key::Special(ScanCode::PAGE_DOWN) => Some(Self::Move(10)),
            Key::Special(ScanCode::HOME) => Some(Self::First),
            Key::Special(ScanCode::END) => Some(Self::Last),
            Key::Special(ScanCode::INSERT | ScanCode::FUNCTION_2) => Some(Self::Options),
            Key::Special(ScanCode::ESCAPE) => Some(Self::Escape),
            Key::Printable(key) => match char::from(key) {
                '\r' | '\n' | ' ' => Some(Self::Select),
                '\t' => Some(Self::Options),
                key => Some(Self::Shortcut(key)),
            },
            Key::Special(_) => None,
        }
    }
}

/// A text console frontend.
pub struct TextFrontend {
    /// Plain text output for launch messages.
    console: UefiConsole,

    /// The keyboard.
    input: ScopedProtocol<Input>,

    /// A periodic one second timer for the timeout.
    timer: Event,
}

impl TextFrontend {
    /// Creates a new [`TextFrontend`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if there is no console input, or the timer cannot be created.
    pub fn new() -> Result<Self, FrontendError> {
        let input = locate_protocol::<Input>().map_err(FrontendError::NoInput)?;

        // SAFETY: the event has no notification function, so nothing runs at an unexpected time
        let timer = unsafe { boot::create_event(EventType::TIMER, Tpl::APPLICATION, None, None) }
            .map_err(FrontendError::Timer)?;
        boot::set_timer(&timer, TimerTrigger::Periodic(TIMER_INTERVAL)).map_err(FrontendError::Timer)?;

        Ok(Self {
            console: UefiConsole::new(),
            input,
            timer,
        })
    }

    /// Waits for a key press, or for the timer when `ticking` is set.
    ///
    /// Returns [`None`] when the timer fired.
    fn wait_for_key(&mut self, ticking: bool) -> Option<Key> {
        loop {
            let mut events: SmallVec<[Event; 2]> = SmallVec::new();
            if let Some(key_event) = self.input.wait_for_key_event() {
                events.push(key_event);
            }
            if ticking {
                // SAFETY: the clone only lives for this wait, and the timer is never closed
                events.push(unsafe { self.timer.unsafe_clone() });
            }

            if !events.is_empty() {
                match boot::wait_for_event(&mut events) {
                    Ok(index) if ticking && index == events.len() - 1 => return None,
                    Ok(_) => (),
                    Err(e) => error!("Waiting for a key failed: {e:?}"),
                }
            }

            match self.input.read_key() {
                Ok(Some(key)) => return Some(key),
                Ok(None) => (),
                Err(e) => {
                    error!("Reading a key failed: {e}");
                    return None;
                }
            }
        }
    }

    /// Runs a submenu. Returns the chosen entry, or [`None`] if the user went back.
    fn run_submenu(&mut self, screen: &MenuScreen) -> Option<MenuEntry> {
        let mut selected = 0;
        loop {
            draw_screen(&screen.title, &screen.info_lines, &screen.entries, selected, &screen.hints, None);
            let Some(key) = self.wait_for_key(false).and_then(MenuKey::from_key) else {
                continue;
            };
            match key {
                MenuKey::Escape => return None,
                MenuKey::Select => {
                    let entry = screen.entries.get(selected)?;
                    return (entry.kind != EntryKind::Action(Action::Return)).then(|| entry.clone());
                }
                MenuKey::Shortcut(key) => {
                    if let Some(entry) = find_shortcut(&screen.entries, key) {
                        return Some(entry.clone());
                    }
                }
                key => selected = move_cursor(selected, screen.entries.len(), &key),
            }
        }
    }
}

impl Console for TextFrontend {
    fn begin_text_screen(&mut self, title: &str) {
        self.console.begin_text_screen(title);
    }

    fn print_line(&mut self, text: &str) {
        self.console.print_line(text);
    }

    fn print_error(&mut self, text: &str) {
        self.console.print_error(text);
    }

    fn pause_for_key(&mut self) {
        self.console.pause_for_key();
    }
}

impl Frontend for TextFrontend {
    fn run_main_menu(&mut self, menu: &Menu, timeout: u32, default: Option<usize>) -> MenuChoice {
        // whatever ran last printed over the screen, so the next message starts a fresh one
        self.console.leave_text_screen();

        if menu.is_empty() {
            self.begin_text_screen(MAIN_TITLE);
            self.print_error("No boot entries found. Press a key to rescan.");
            self.pause_for_key();
            return MenuChoice::Escape;
        }

        let mut selected = default.unwrap_or(0).min(menu.len() - 1);
        let mut remaining = (timeout > 0).then_some(timeout);
        loop {
            let footer = remaining.map(|x| format!("Booting the default entry in {x} seconds"));
            draw_screen(MAIN_TITLE, &[], &menu.entries, selected, &MAIN_HINTS, footer.as_deref());

            let Some(key) = self.wait_for_key(remaining.is_some()) else {
                remaining = remaining.map(|x| x.saturating_sub(1));
                if remaining == Some(0) {
                    return chosen(menu, selected, None);
                }
                continue;
            };
            remaining = None;

            let Some(key) = MenuKey::from_key(key) else {
                continue;
            };
            match key {
                MenuKey::Escape => return MenuChoice::Escape,
                MenuKey::Select => return chosen(menu, selected, None),
                MenuKey::Options => {
                    if let Some(submenu) = &menu.entries[selected].submenu
                        && let Some(entry) = self.run_submenu(submenu)
                    {
                        return chosen(menu, selected, Some(entry));
                    }
                }
                MenuKey::Shortcut(key) => {
                    if let Some(index) = menu.find_by_shortcut(key) {
                        return chosen(menu, index, None);
                    }
                }
                key => selected = move_cursor(selected, menu.len(), &key),
            }
        }
    }

    fn show_screen(&mut self, screen: &MenuScreen) {
        self.console.leave_text_screen();
        let _ = self.run_submenu(screen);
    }
}

/// Builds the choice for the main menu entry at `index`, or for an entry of its submenu.
fn chosen(menu: &Menu, index: usize, submenu_entry: Option<MenuEntry>) -> MenuChoice {
    let main = &menu.entries[index];
    MenuChoice::Chosen {
        entry: submenu_entry.unwrap_or_else(|| main.clone()),
        selection: main.title.clone(),
    }
}

/// Finds the entry of a screen that owns a shortcut key.
fn find_shortcut(entries: &[MenuEntry], key: char) -> Option<&MenuEntry> {
    let key = key.to_ascii_uppercase();
    entries
        .iter()
        .find(|x| x.shortcut == Some(key) || x.shortcut_digit == Some(key))
}

/// Applies a cursor movement to a list of `len` entries.
fn move_cursor(selected: usize, len: usize, key: &MenuKey) -> usize {
    let last = len.saturating_sub(1);
    match key {
        MenuKey::Move(offset) => selected.saturating_add_signed(*offset).min(last),
        MenuKey::First => 0,
        MenuKey::Last => last,
        _ => selected,
    }
}

/// Draws a full screen of entries.
fn draw_screen(
    title: &str,
    info_lines: &[String],
    entries: &[MenuEntry],
    selected: usize,
    hints: &[&str],
    footer: Option<&str>,
) {
    with_stdout(|stdout| {
        let _ = stdout.set_color(Color::LightGray, Color::Black);
        let _ = stdout.clear();
        let _ = stdout.set_color(Color::Black, Color::LightGray);
        let _ = writeln!(stdout, " {title} ");
        let _ = stdout.set_color(Color::LightGray, Color::Black);
        let _ = writeln!(stdout);

        for line in info_lines {
            let _ = writeln!(stdout, "  {line}");
        }
        if !info_lines.is_empty() {
            let _ = writeln!(stdout);
        }

        let mut previous_row = None;
        for (index, entry) in entries.iter().enumerate() {
            if previous_row.is_some_and(|x| x != entry.row) {
                let _ = writeln!(stdout);
            }
            previous_row = Some(entry.row);

            if index == selected {
                let _ = stdout.set_color(Color::Black, Color::LightGray);
            }
            let _ = writeln!(stdout, "{}", entry_line(entry));
            let _ = stdout.set_color(Color::LightGray, Color::Black);
        }

        let _ = writeln!(stdout);
        for hint in hints {
            let _ = writeln!(stdout, "{hint}");
        }
        if let Some(footer) = footer {
            let _ = writeln!(stdout);
            let _ = stdout.set_color(Color::Yellow, Color::Black);
            let _ = writeln!(stdout, "{footer}");
            let _ = stdout.set_color(Color::LightGray, Color::Black);
        }
    });
}

/// Formats one entry with its shortcut and a marker for entries that have a submenu.
fn entry_line(entry: &MenuEntry) -> String {
    let key = entry.shortcut_digit.or(entry.shortcut).unwrap_or(' ');
    let marker = if entry.submenu.is_some() { '+' } else { ' ' };
    match entry.row {
        Row::Primary => format!(" {key} {marker} {}", entry.title),
        Row::Tools => format!(" {key}   [{}]", entry.title),
    }
}
