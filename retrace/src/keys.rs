//! Key naming shared by the recorder (event → name) and the input synthesizer
//! (name → key presses).
//!
//! Recorded special keys are written as `Key.<name>` (`Key.enter`, `Key.f5`, ...). On
//! playback the prefix is optional and names are case-insensitive, so `Return`,
//! `enter` and `Key.enter` all press the same key.

use rdev::Key;

/// Prefix used when recording a non-character key.
pub const KEY_PREFIX: &str = "Key.";

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1,
    Key::F2,
    Key::F3,
    Key::F4,
    Key::F5,
    Key::F6,
    Key::F7,
    Key::F8,
    Key::F9,
    Key::F10,
    Key::F11,
    Key::F12,
];

/// Looks up a symbolic key name. Single characters are not names; see [`char_key`].
pub fn key_from_name(name: &str) -> Option<Key> {
    let trimmed = name.trim();
    let bare = trimmed.strip_prefix(KEY_PREFIX).unwrap_or(trimmed);
    if bare.chars().count() < 2 {
        return None;
    }
    let lower = bare.to_ascii_lowercase();

    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<usize>().ok()) {
        return (1..=12).contains(&n).then(|| FUNCTION_KEYS[n - 1]);
    }

    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "esc" | "escape" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "insert" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" | "pageup" => Key::PageUp,
        "page_down" | "pagedown" => Key::PageDown,
        "up" | "uparrow" => Key::UpArrow,
        "down" | "downarrow" => Key::DownArrow,
        "left" | "leftarrow" => Key::LeftArrow,
        "right" | "rightarrow" => Key::RightArrow,
        "shift" | "shift_l" | "shiftleft" => Key::ShiftLeft,
        "shift_r" | "shiftright" => Key::ShiftRight,
        "ctrl" | "control" | "ctrl_l" | "controlleft" => Key::ControlLeft,
        "ctrl_r" | "controlright" => Key::ControlRight,
        "alt" | "alt_l" => Key::Alt,
        "alt_r" | "alt_gr" | "altgr" => Key::AltGr,
        "cmd" | "cmd_l" | "meta" | "metaleft" | "super" | "win" => Key::MetaLeft,
        "cmd_r" | "metaright" => Key::MetaRight,
        "caps_lock" | "capslock" => Key::CapsLock,
        "num_lock" | "numlock" => Key::NumLock,
        "scroll_lock" | "scrolllock" => Key::ScrollLock,
        "print_screen" | "printscreen" => Key::PrintScreen,
        "pause" => Key::Pause,
        _ => return None,
    };
    Some(key)
}

/// Canonical lower-case name of a key, as recorded after [`KEY_PREFIX`].
pub fn key_name(key: Key) -> String {
    if let Some(i) = FUNCTION_KEYS.iter().position(|k| *k == key) {
        return format!("f{}", i + 1);
    }
    let name = match key {
        Key::Return | Key::KpReturn => "enter",
        Key::Escape => "esc",
        Key::Tab => "tab",
        Key::Space => "space",
        Key::Backspace => "backspace",
        Key::Delete | Key::KpDelete => "delete",
        Key::Insert => "insert",
        Key::Home => "home",
        Key::End => "end",
        Key::PageUp => "page_up",
        Key::PageDown => "page_down",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        Key::ShiftLeft => "shift",
        Key::ShiftRight => "shift_r",
        Key::ControlLeft => "ctrl_l",
        Key::ControlRight => "ctrl_r",
        Key::Alt => "alt_l",
        Key::AltGr => "alt_gr",
        Key::MetaLeft => "cmd",
        Key::MetaRight => "cmd_r",
        Key::CapsLock => "caps_lock",
        Key::NumLock => "num_lock",
        Key::ScrollLock => "scroll_lock",
        Key::PrintScreen => "print_screen",
        Key::Pause => "pause",
        other => return format!("{other:?}").to_ascii_lowercase(),
    };
    name.to_string()
}

/// Recorded form of a key without a printable character.
pub fn recorded_name(key: Key) -> String {
    format!("{KEY_PREFIX}{}", key_name(key))
}

/// Physical key and shift state producing `c` on a US layout.
pub fn char_key(c: char) -> Option<(Key, bool)> {
    if c.is_ascii_lowercase() {
        return letter_key(c).map(|k| (k, false));
    }
    if c.is_ascii_uppercase() {
        return letter_key(c.to_ascii_lowercase()).map(|k| (k, true));
    }
    let mapped = match c {
        '1' => (Key::Num1, false),
        '2' => (Key::Num2, false),
        '3' => (Key::Num3, false),
        '4' => (Key::Num4, false),
        '5' => (Key::Num5, false),
        '6' => (Key::Num6, false),
        '7' => (Key::Num7, false),
        '8' => (Key::Num8, false),
        '9' => (Key::Num9, false),
        '0' => (Key::Num0, false),
        '!' => (Key::Num1, true),
        '@' => (Key::Num2, true),
        '#' => (Key::Num3, true),
        '$' => (Key::Num4, true),
        '%' => (Key::Num5, true),
        '^' => (Key::Num6, true),
        '&' => (Key::Num7, true),
        '*' => (Key::Num8, true),
        '(' => (Key::Num9, true),
        ')' => (Key::Num0, true),
        '-' => (Key::Minus, false),
        '_' => (Key::Minus, true),
        '=' => (Key::Equal, false),
        '+' => (Key::Equal, true),
        '[' => (Key::LeftBracket, false),
        '{' => (Key::LeftBracket, true),
        ']' => (Key::RightBracket, false),
        '}' => (Key::RightBracket, true),
        '\\' => (Key::BackSlash, false),
        '|' => (Key::BackSlash, true),
        ';' => (Key::SemiColon, false),
        ':' => (Key::SemiColon, true),
        '\'' => (Key::Quote, false),
        '"' => (Key::Quote, true),
        ',' => (Key::Comma, false),
        '<' => (Key::Comma, true),
        '.' => (Key::Dot, false),
        '>' => (Key::Dot, true),
        '/' => (Key::Slash, false),
        '?' => (Key::Slash, true),
        '`' => (Key::BackQuote, false),
        '~' => (Key::BackQuote, true),
        ' ' => (Key::Space, false),
        '\t' => (Key::Tab, false),
        '\n' | '\r' => (Key::Return, false),
        _ => return None,
    };
    Some(mapped)
}

fn letter_key(c: char) -> Option<Key> {
    let key = match c {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        _ => return None,
    };
    Some(key)
}
