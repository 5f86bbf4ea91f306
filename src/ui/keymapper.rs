//! Key mapping for terminal input
//!
//! Converts key events to the VT sequences the RP6502 console expects, for
//! hosts that deliver key events instead of a raw byte stream.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::codepage::CodePage;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Key mapper for converting key events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent to bytes for the device
    pub fn map(event: &KeyEvent, code_page: &CodePage) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char(ch) => Self::map_char(ch, mods, code_page),

            KeyCode::Enter => Some(vec![0x0D]),
            KeyCode::Backspace => Some(vec![0x08]),
            KeyCode::Tab => Some(vec![0x09]),
            KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
            KeyCode::Esc => Some(vec![0x1B]),

            // Arrow keys
            KeyCode::Up => Some(Self::letter_key(b'A', mods)),
            KeyCode::Down => Some(Self::letter_key(b'B', mods)),
            KeyCode::Right => Some(Self::letter_key(b'C', mods)),
            KeyCode::Left => Some(Self::letter_key(b'D', mods)),

            // Navigation keys
            KeyCode::Home => Some(Self::letter_key(b'H', mods)),
            KeyCode::End => Some(Self::letter_key(b'F', mods)),
            KeyCode::Insert => Some(Self::tilde_key(2, mods)),
            KeyCode::Delete => Some(Self::tilde_key(3, mods)),
            KeyCode::PageUp => Some(Self::tilde_key(5, mods)),
            KeyCode::PageDown => Some(Self::tilde_key(6, mods)),

            KeyCode::F(n) => Self::function_key(n, mods),

            _ => None,
        }
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers, code_page: &CodePage) -> Option<Vec<u8>> {
        // Ctrl + letter = C0 control code
        if mods.contains(Modifiers::CTRL) {
            let code = match ch {
                'a'..='z' | 'A'..='Z' => Some(ch.to_ascii_uppercase() as u8 - 64),
                '@' | ' ' => Some(0x00),
                '[' => Some(0x1B),
                '\\' => Some(0x1C),
                ']' => Some(0x1D),
                '^' => Some(0x1E),
                '_' => Some(0x1F),
                _ => None,
            };
            if let Some(code) = code {
                return Some(if mods.contains(Modifiers::ALT) {
                    vec![0x1B, code]
                } else {
                    vec![code]
                });
            }
        }

        let byte = code_page.encode_char(ch)?;

        // Alt + key = ESC + key
        if mods.contains(Modifiers::ALT) {
            Some(vec![0x1B, byte])
        } else {
            Some(vec![byte])
        }
    }

    /// Cursor and Home/End: CSI <key>, or CSI 1 ; <mod> <key>
    fn letter_key(key: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            vec![0x1B, b'[', key]
        } else {
            format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
        }
    }

    /// Tilde key sequence (Insert, Delete, PageUp, PageDown, F5-F12)
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, Self::modifier_code(mods)).into_bytes()
        }
    }

    /// Function key sequence
    fn function_key(n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        let code = match n {
            1..=4 => {
                // ESC O P..S, or CSI 1 ; <mod> P..S
                let key = b'P' + (n - 1);
                return Some(if mods.is_empty() {
                    vec![0x1B, b'O', key]
                } else {
                    Self::letter_key(key, mods)
                });
            }
            5 => 15,
            6 => 17,
            7 => 18,
            8 => 19,
            9 => 20,
            10 => 21,
            11 => 23,
            12 => 24,
            _ => return None,
        };
        Some(Self::tilde_key(code, mods))
    }

    /// xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4)
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}
