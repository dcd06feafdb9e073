//! Where all output goes.

use std::fmt::Display;
use std::io::{self, Write};

use ansi_term::Colour;

use crate::decode::DecodedField;

/// Line-oriented text sink with a verbose switch.
pub struct Report<W> {
    out: W,
    verbose: bool,
    color: bool,
}

impl<W: Write> Report<W> {
    pub fn new(out: W) -> Self {
        Self { out, verbose: false, color: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Paint `Error:` lines red.
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn write(&mut self, text: impl Display) -> io::Result<()> {
        write!(self.out, "{text}")
    }

    pub fn line(&mut self, text: impl Display) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    /// Progress chatter, dropped unless verbose.
    pub fn note(&mut self, text: impl Display) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        self.line(text)
    }

    pub fn error(&mut self, text: impl Display) -> io::Result<()> {
        if self.color {
            writeln!(self.out, "{}{text}", Colour::Red.paint("Error: "))
        } else {
            writeln!(self.out, "Error: {text}")
        }
    }

    /// Decoded fields, then a line break. Values are followed by a space;
    /// unknown names are written bare.
    pub fn fields(&mut self, fields: &[DecodedField]) -> io::Result<()> {
        for field in fields {
            match field {
                DecodedField::Missing(_) => write!(self.out, "{field}")?,
                DecodedField::Value { .. } => write!(self.out, "{field} ")?,
            }
        }
        writeln!(self.out)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
