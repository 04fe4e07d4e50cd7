use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::error::Result;

/// Line-oriented sink for generated YAML.
///
/// Blank lines are dropped and trailing whitespace is trimmed, so templates
/// can be written without caring about whitespace control.
pub struct Outputter<W: Write> {
    writer: W,
    count: usize,
}

impl<W: Write> Outputter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Writes `line` unless it is blank.
    pub fn output_config(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        writeln!(self.writer, "{}", line.trim_end())?;
        self.count += 1;
        Ok(())
    }

    /// Writes every line of a multi-line block.
    pub fn output_block(&mut self, block: &str) -> Result<()> {
        for line in block.lines() {
            self.output_config(line)?;
        }
        Ok(())
    }

    /// Number of lines written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Opens a destination: stdout when `path` is `None`, otherwise the file,
/// created or truncated.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        None => Ok(Box::new(io::stdout())),
        Some(path) => {
            info!("Writing output to: {}", path.display());
            let file = File::create(path)?;
            Ok(Box::new(BufWriter::new(file)))
        }
    }
}
