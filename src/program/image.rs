//! Hex program image format.
//!
//! A simple text format, one record per line:
//! - The first record is the load address
//! - Every following record is one word, loaded at consecutive addresses
//! - Records are up to four hex digits, optionally prefixed with `x` or `0x`
//! - Text after `;` is a comment; blank lines are ignored
//!
//! ```text
//! 3000    ; origin
//! E005    ; LEA R0, #5
//! F025    ; HALT
//! ```
//!
//! Saved ranges use the same word records without an origin line.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// A parsed program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    /// Load (and start) address.
    pub origin: u16,
    /// Words loaded from `origin` upward.
    pub words: Vec<u16>,
}

impl ProgramImage {
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Get the number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Render in the image format, origin first.
    pub fn to_text(&self) -> String {
        let mut out = format!("{:04X}\n", self.origin);
        for word in &self.words {
            out.push_str(&format!("{:04X}\n", word));
        }
        out
    }
}

/// Parse an image from text.
pub fn parse_image(text: &str) -> Result<ProgramImage, ImageError> {
    parse_lines(text.lines().map(|l| Ok(l.to_string())))
}

/// Load an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    let reader = BufReader::new(file);
    parse_lines(reader.lines().map(|l| l.map_err(|e| ImageError::IoError(e.to_string()))))
}

/// Write words as image records, one per line.
pub fn save_words<P: AsRef<Path>>(path: P, words: &[u16]) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;

    for word in words {
        writeln!(file, "{:04X}", word)
            .map_err(|e| ImageError::IoError(e.to_string()))?;
    }

    Ok(())
}

fn parse_lines<I>(lines: I) -> Result<ProgramImage, ImageError>
where
    I: Iterator<Item = Result<String, ImageError>>,
{
    let mut origin = None;
    let mut words = Vec::new();

    for (line_num, line) in lines.enumerate() {
        let line = line?;
        let record = match line.find(';') {
            Some(idx) => &line[..idx],
            None => &line[..],
        }
        .trim();

        // Skip empty lines and comments
        if record.is_empty() {
            continue;
        }

        let word = parse_record(record).map_err(|message| ImageError::ParseError {
            line: line_num + 1,
            message,
        })?;

        match origin {
            None => origin = Some(word),
            Some(_) => words.push(word),
        }
    }

    let origin = origin.ok_or(ImageError::MissingOrigin)?;
    Ok(ProgramImage { origin, words })
}

/// Parse one record: up to four hex digits with an optional `x`/`0x`.
pub fn parse_record(record: &str) -> Result<u16, String> {
    let digits = record
        .strip_prefix("0x")
        .or_else(|| record.strip_prefix("0X"))
        .or_else(|| record.strip_prefix('x'))
        .or_else(|| record.strip_prefix('X'))
        .unwrap_or(record);

    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected a 4-digit hex word, found {:?}", record));
    }
    u16::from_str_radix(digits, 16).map_err(|e| e.to_string())
}

/// Errors that can occur reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("image has no load address")]
    MissingOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image() {
        let image = parse_image("3000\nE005 ; LEA\n\n; comment\nxF025\n").unwrap();
        assert_eq!(image.origin, 0x3000);
        assert_eq!(image.words, vec![0xE005, 0xF025]);
    }

    #[test]
    fn test_parse_origin_only() {
        let image = parse_image("0x4000").unwrap();
        assert_eq!(image.origin, 0x4000);
        assert!(image.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_image("; nothing\n"), Err(ImageError::MissingOrigin));

        match parse_image("3000\n12345\n") {
            Err(ImageError::ParseError { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_image("3000\nZZZZ\n").is_err());
    }

    #[test]
    fn test_to_text_roundtrip() {
        let image = ProgramImage::new(0x3000, vec![0x1234, 0x00AB]);
        assert_eq!(image.to_text(), "3000\n1234\n00AB\n");
        assert_eq!(parse_image(&image.to_text()).unwrap(), image);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("slc3-image-test-{}.hex", std::process::id()));

        save_words(&path, &[0x3000, 0xF025]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "3000\nF025\n");

        // saved words reload as an image whose first word is the origin
        let image = load_image(&path).unwrap();
        assert_eq!(image, ProgramImage::new(0x3000, vec![0xF025]));

        std::fs::remove_file(&path).unwrap();
    }
}
