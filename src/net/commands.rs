//! Builders for the device's ASCII command protocol. Every verb the bot
//! speaks is produced here so the wire vocabulary stays in one place.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A,
    B,
    X,
    Y,
    L,
    R,
    Zl,
    Zr,
    Plus,
    Minus,
    Home,
    Capture,
    DUp,
    DDown,
    DLeft,
    DRight,
}

impl Button {
    pub fn token(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::L => "L",
            Button::R => "R",
            Button::Zl => "ZL",
            Button::Zr => "ZR",
            Button::Plus => "PLUS",
            Button::Minus => "MINUS",
            Button::Home => "HOME",
            Button::Capture => "CAPTURE",
            Button::DUp => "DUP",
            Button::DDown => "DDOWN",
            Button::DLeft => "DLEFT",
            Button::DRight => "DRIGHT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    Left,
    Right,
}

impl Stick {
    pub fn token(self) -> &'static str {
        match self {
            Stick::Left => "LEFT",
            Stick::Right => "RIGHT",
        }
    }
}

pub fn peek(address: u64, length: usize) -> String {
    format!("peek 0x{address:X} {length}")
}

pub fn poke(address: u64, data: &[u8]) -> String {
    format!("poke 0x{address:X} 0x{}", encode_hex(data))
}

/// Resolves a pointer chain; the device answers with the base address of the
/// chain head dereferenced through all but the final element.
pub fn pointer(jumps: &[u64]) -> String {
    let mut line = String::from("pointer");
    for jump in jumps {
        line.push_str(&format!(" 0x{jump:X}"));
    }
    line
}

pub fn peek_absolute(address: u64, length: usize) -> String {
    format!("peekAbsolute 0x{address:X} {length}")
}

pub fn poke_absolute(address: u64, data: &[u8]) -> String {
    format!("pokeAbsolute 0x{address:X} 0x{}", encode_hex(data))
}

pub fn click(button: Button) -> String {
    format!("click {}", button.token())
}

pub fn press(button: Button) -> String {
    format!("press {}", button.token())
}

pub fn release(button: Button) -> String {
    format!("release {}", button.token())
}

pub fn set_stick(stick: Stick, x: i16, y: i16) -> String {
    format!("setStick {} 0x{:X} 0x{:X}", stick.token(), x as u16, y as u16)
}

pub fn freeze(address: u64, data: &[u8]) -> String {
    format!("freeze 0x{address:X} 0x{}", encode_hex(data))
}

pub fn unfreeze(address: u64) -> String {
    format!("unFreeze 0x{address:X}")
}

pub fn get_version() -> String {
    "getVersion".to_string()
}

pub fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    let trimmed = text.trim();
    if trimmed.len() % 2 != 0 {
        return Err(format!("hex response has odd length {}", trimmed.len()));
    }
    let mut out = Vec::with_capacity(trimmed.len() / 2);
    let bytes = trimmed.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = hex_nibble(pair[0])?;
        let lo = hex_nibble(pair[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_nibble(byte: u8) -> Result<u8, String> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        other => Err(format!("invalid hex byte 0x{other:02X}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_and_poke_format() {
        assert_eq!(peek(0xABCD, 8), "peek 0xABCD 8");
        assert_eq!(poke(0x10, &[0xDE, 0xAD]), "poke 0x10 0xDEAD");
    }

    #[test]
    fn pointer_chain_format() {
        assert_eq!(
            pointer(&[0x3A2B3C8, 0x18, 0x20]),
            "pointer 0x3A2B3C8 0x18 0x20"
        );
    }

    #[test]
    fn stick_values_encode_as_u16() {
        assert_eq!(set_stick(Stick::Left, -0x7FFF, 0), "setStick LEFT 0x8001 0x0");
    }

    #[test]
    fn hex_roundtrip() {
        let data = [0x00, 0x7F, 0xFF, 0x0A];
        assert_eq!(decode_hex(&encode_hex(&data)).expect("decode"), data);
    }

    #[test]
    fn hex_decode_rejects_garbage() {
        assert!(decode_hex("0G").is_err());
        assert!(decode_hex("ABC").is_err());
    }

    #[test]
    fn hex_decode_accepts_lower_and_trims() {
        assert_eq!(decode_hex(" deadBEEF\r\n").expect("decode"), [0xDE, 0xAD, 0xBE, 0xEF]);
    }
}
