use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::net::commands::{self, Button, Stick};

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const LINE_TERMINATOR: &str = "\r\n";

/// Duplex byte channel speaking the device's line protocol. Commands go out
/// as ASCII lines; responses, where a verb produces one, come back as ASCII
/// lines too.
pub trait Transport: Send {
    fn send_line(&mut self, line: &str) -> Result<(), String>;
    fn read_line(&mut self) -> Result<String, String>;
}

pub struct TcpTransport {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TcpTransport {
    pub fn connect(addr: &str) -> Result<Self, String> {
        let stream = TcpStream::connect(addr)
            .map_err(|err| format!("device connect to {addr} failed: {err}"))?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|err| format!("device read timeout set failed: {err}"))?;
        stream
            .set_nodelay(true)
            .map_err(|err| format!("device nodelay set failed: {err}"))?;
        Ok(Self {
            stream,
            buffer: Vec::new(),
        })
    }
}

impl Transport for TcpTransport {
    fn send_line(&mut self, line: &str) -> Result<(), String> {
        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str(LINE_TERMINATOR);
        self.stream
            .write_all(framed.as_bytes())
            .map_err(|err| format!("device write failed: {err}"))
    }

    fn read_line(&mut self) -> Result<String, String> {
        loop {
            if let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=position).collect();
                let text = String::from_utf8_lossy(&line).trim().to_string();
                return Ok(text);
            }
            let mut chunk = [0u8; 1024];
            let read = self
                .stream
                .read(&mut chunk)
                .map_err(|err| format!("device read failed: {err}"))?;
            if read == 0 {
                return Err("device connection closed".to_string());
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
}

/// Typed operations over a raw transport. Exclusively owned by the worker
/// for the duration of a session.
pub struct DeviceLink {
    transport: Box<dyn Transport>,
}

impl DeviceLink {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn peek(&mut self, address: u64, length: usize) -> Result<Vec<u8>, String> {
        self.transport.send_line(&commands::peek(address, length))?;
        let line = self.transport.read_line()?;
        let bytes = commands::decode_hex(&line)
            .map_err(|err| format!("peek 0x{address:X} response invalid: {err}"))?;
        if bytes.len() != length {
            return Err(format!(
                "peek 0x{address:X} expected {length} bytes, got {}",
                bytes.len()
            ));
        }
        Ok(bytes)
    }

    pub fn poke(&mut self, address: u64, data: &[u8]) -> Result<(), String> {
        self.transport.send_line(&commands::poke(address, data))
    }

    pub fn peek_absolute(&mut self, address: u64, length: usize) -> Result<Vec<u8>, String> {
        self.transport
            .send_line(&commands::peek_absolute(address, length))?;
        let line = self.transport.read_line()?;
        let bytes = commands::decode_hex(&line)
            .map_err(|err| format!("peekAbsolute 0x{address:X} response invalid: {err}"))?;
        if bytes.len() != length {
            return Err(format!(
                "peekAbsolute 0x{address:X} expected {length} bytes, got {}",
                bytes.len()
            ));
        }
        Ok(bytes)
    }

    pub fn poke_absolute(&mut self, address: u64, data: &[u8]) -> Result<(), String> {
        self.transport
            .send_line(&commands::poke_absolute(address, data))
    }

    /// Resolves a pointer chain head. The response is the 8-byte base
    /// address, big-endian; the caller applies any trailing arithmetic
    /// offset itself.
    pub fn pointer_base(&mut self, jumps: &[u64]) -> Result<u64, String> {
        self.transport.send_line(&commands::pointer(jumps))?;
        let line = self.transport.read_line()?;
        let bytes = commands::decode_hex(&line)
            .map_err(|err| format!("pointer response invalid: {err}"))?;
        if bytes.len() != 8 {
            return Err(format!("pointer response expected 8 bytes, got {}", bytes.len()));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn click(&mut self, button: Button) -> Result<(), String> {
        self.transport.send_line(&commands::click(button))
    }

    pub fn press(&mut self, button: Button) -> Result<(), String> {
        self.transport.send_line(&commands::press(button))
    }

    pub fn release(&mut self, button: Button) -> Result<(), String> {
        self.transport.send_line(&commands::release(button))
    }

    pub fn set_stick(&mut self, stick: Stick, x: i16, y: i16) -> Result<(), String> {
        self.transport.send_line(&commands::set_stick(stick, x, y))
    }

    pub fn freeze(&mut self, address: u64, data: &[u8]) -> Result<(), String> {
        self.transport.send_line(&commands::freeze(address, data))
    }

    pub fn unfreeze(&mut self, address: u64) -> Result<(), String> {
        self.transport.send_line(&commands::unfreeze(address))
    }

    pub fn version(&mut self) -> Result<String, String> {
        self.transport.send_line(&commands::get_version())?;
        self.transport.read_line()
    }
}

#[cfg(test)]
pub mod mock {
    use super::Transport;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory device: records every line sent and answers reads from a
    /// scripted response function over a byte-addressable memory image.
    #[derive(Default)]
    pub struct MockDeviceState {
        pub sent: Vec<String>,
        pub memory: std::collections::HashMap<u64, Vec<u8>>,
        /// Per-address read scripts; each peek pops the next value, the last
        /// value sticks once the script is exhausted.
        pub sequences: std::collections::HashMap<u64, VecDeque<Vec<u8>>>,
        pub responses: VecDeque<String>,
        pub pointer_base: u64,
    }

    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub state: Arc<Mutex<MockDeviceState>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn write_memory(&self, address: u64, data: &[u8]) {
            let mut state = self.state.lock().expect("mock state");
            state.memory.insert(address, data.to_vec());
        }

        pub fn push_sequence(&self, address: u64, values: Vec<Vec<u8>>) {
            let mut state = self.state.lock().expect("mock state");
            state.sequences.insert(address, values.into());
        }

        pub fn sent_lines(&self) -> Vec<String> {
            self.state.lock().expect("mock state").sent.clone()
        }

        fn lookup(&self, address: u64, length: usize) -> Vec<u8> {
            let mut state = self.state.lock().expect("mock state");
            if let Some(script) = state.sequences.get_mut(&address) {
                let value = if script.len() > 1 {
                    script.pop_front().unwrap_or_default()
                } else {
                    script.front().cloned().unwrap_or_default()
                };
                let mut out = value;
                out.resize(length, 0);
                return out;
            }
            // Serve from the closest block containing the range, zero-fill
            // anything unmapped.
            for (base, data) in &state.memory {
                if address >= *base && (address + length as u64) <= (*base + data.len() as u64) {
                    let start = (address - *base) as usize;
                    return data[start..start + length].to_vec();
                }
            }
            vec![0u8; length]
        }
    }

    impl Transport for MockTransport {
        fn send_line(&mut self, line: &str) -> Result<(), String> {
            let mut state = self.state.lock().expect("mock state");
            state.sent.push(line.to_string());
            Ok(())
        }

        fn read_line(&mut self) -> Result<String, String> {
            let (last, scripted, pointer_base) = {
                let mut state = self.state.lock().expect("mock state");
                let last = state.sent.last().cloned().unwrap_or_default();
                let scripted = state.responses.pop_front();
                (last, scripted, state.pointer_base)
            };
            if let Some(response) = scripted {
                return Ok(response);
            }
            if last.starts_with("peek ") || last.starts_with("peekAbsolute ") {
                let mut parts = last.split_whitespace();
                parts.next();
                let address = parts
                    .next()
                    .and_then(|token| u64::from_str_radix(token.trim_start_matches("0x"), 16).ok())
                    .unwrap_or(0);
                let length = parts
                    .next()
                    .and_then(|token| token.parse::<usize>().ok())
                    .unwrap_or(0);
                return Ok(crate::net::commands::encode_hex(&self.lookup(address, length)));
            }
            if last.starts_with("pointer") {
                return Ok(crate::net::commands::encode_hex(&pointer_base.to_be_bytes()));
            }
            if last == "getVersion" {
                return Ok("2.4".to_string());
            }
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn peek_decodes_memory_image() {
        let mock = MockTransport::new();
        mock.write_memory(0x1000, &[0xAA, 0xBB, 0xCC, 0xDD]);
        let mut link = DeviceLink::new(Box::new(mock));
        let bytes = link.peek(0x1001, 2).expect("peek");
        assert_eq!(bytes, [0xBB, 0xCC]);
    }

    #[test]
    fn pointer_base_is_big_endian() {
        let mock = MockTransport::new();
        mock.state.lock().expect("mock state").pointer_base = 0x0000_00AB_CDEF_0123;
        let mut link = DeviceLink::new(Box::new(mock));
        let base = link.pointer_base(&[0x10, 0x20]).expect("pointer");
        assert_eq!(base, 0x0000_00AB_CDEF_0123);
    }

    #[test]
    fn poke_formats_command_line() {
        let mock = MockTransport::new();
        let mut link = DeviceLink::new(Box::new(mock.clone()));
        link.poke(0x20, &[0x01, 0x02]).expect("poke");
        assert_eq!(mock.sent_lines(), vec!["poke 0x20 0x0102".to_string()]);
    }
}
