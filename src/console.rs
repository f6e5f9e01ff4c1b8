//! Console capability for the trap dispatcher.
//!
//! GETC needs one raw, unbuffered, non-echoing character; OUT and PUTS
//! write unbuffered characters. The core only sees the [`Console`] trait.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

/// Single-character input and output.
pub trait Console {
    /// Block until one character is available and return it.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Emit one character.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Push buffered output to the device.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The process terminal. Input is read in raw mode so a key press is seen
/// immediately and is not echoed.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl TerminalConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for TerminalConsole {
    fn read_byte(&mut self) -> io::Result<u8> {
        use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
        use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

        enable_raw_mode()?;
        let result = loop {
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        break Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"));
                    }
                    KeyCode::Char(c) if c.is_ascii() => break Ok(c as u8),
                    KeyCode::Enter => break Ok(b'\n'),
                    KeyCode::Tab => break Ok(b'\t'),
                    KeyCode::Backspace => break Ok(0x08),
                    KeyCode::Esc => break Ok(0x1B),
                    _ => continue,
                },
                Ok(_) => continue,
                Err(e) => break Err(e),
            }
        };
        disable_raw_mode()?;
        result
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        io::stdout().write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// In-memory console: input from a queue, output collected in a buffer.
/// Reading with an empty queue fails with `UnexpectedEof`.
///
/// Clones share the same buffers, so a caller can keep a handle after
/// giving the console to a [`Simulator`](crate::Simulator).
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    inner: Rc<RefCell<Buffers>>,
}

#[derive(Debug, Default)]
struct Buffers {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferConsole {
    pub fn with_input(input: &str) -> Self {
        let console = Self::default();
        console.feed(input);
        console
    }

    /// Queue more input.
    pub fn feed(&self, input: &str) {
        self.inner.borrow_mut().input.extend(input.bytes());
    }

    /// Everything written so far, lossily decoded.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().output).into_owned()
    }

    /// Take and clear the output.
    pub fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut self.inner.borrow_mut().output);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Console for BufferConsole {
    fn read_byte(&mut self) -> io::Result<u8> {
        self.inner
            .borrow_mut()
            .input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "console input exhausted"))
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.inner.borrow_mut().output.push(byte);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console() {
        let mut io = BufferConsole::with_input("ab");
        assert_eq!(io.read_byte().unwrap(), b'a');
        io.feed("c");
        assert_eq!(io.read_byte().unwrap(), b'b');
        assert_eq!(io.read_byte().unwrap(), b'c');
        assert_eq!(io.read_byte().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);

        io.write_byte(b'x').unwrap();
        io.write_byte(b'y').unwrap();
        assert_eq!(io.take_output(), "xy");
        assert_eq!(io.output(), "");
    }

    #[test]
    fn test_clones_share_buffers() {
        let handle = BufferConsole::default();
        let mut io: Box<dyn Console> = Box::new(handle.clone());
        io.write_byte(b'k').unwrap();
        assert_eq!(handle.output(), "k");
    }
}
