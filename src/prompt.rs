//! Interactive selection of the directory to analyze.

use crate::{Error, Result};
use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

/// Ask for a path on `output` until a line read from `input` names an
/// existing one.
pub fn prompt_path<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<PathBuf> {
    writeln!(output, "|| ANALYZE SPECIFIED DIRECTORY ||")?;
    writeln!(output)?;
    writeln!(output, "Enter the path to be analyzed:")?;
    output.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(Error::NoInput);
        }
        let path = PathBuf::from(line.trim());
        if !path.as_os_str().is_empty() && path.exists() {
            return Ok(path);
        }
        writeln!(output)?;
        writeln!(output, "The path is incorrect! Try again:")?;
        output.flush()?;
    }
}
