use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

use crate::recognize::stages::PlateReader;

/// Placeholder replaced by the crop path in the argument list.
pub const CROP_PLACEHOLDER: &str = "{crop}";

/// Plate reader backed by an external OCR program.
///
/// The default invocation is `tesseract {crop} stdout --psm 7`. Whatever the
/// program prints is split on whitespace, the tokens joined in order and
/// uppercased.
#[derive(Clone, Debug)]
pub struct CommandPlateReader {
    program: String,
    args: Vec<String>,
}

impl CommandPlateReader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a command line such as `"tesseract {crop} stdout --psm 7"`.
    /// A line without `{crop}` gets the crop path appended.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("ocr command must not be empty"))?;
        let mut args: Vec<String> = parts.collect();
        if !args.iter().any(|arg| arg.contains(CROP_PLACEHOLDER)) {
            args.push(CROP_PLACEHOLDER.to_string());
        }
        Ok(Self::new(program, args))
    }

    pub fn tesseract() -> Self {
        Self::new(
            "tesseract",
            vec![
                CROP_PLACEHOLDER.to_string(),
                "stdout".to_string(),
                "--psm".to_string(),
                "7".to_string(),
            ],
        )
    }

    fn args_for(&self, crop: &Path) -> Vec<String> {
        let crop = crop.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(CROP_PLACEHOLDER, &crop))
            .collect()
    }
}

impl Default for CommandPlateReader {
    fn default() -> Self {
        Self::tesseract()
    }
}

/// Join OCR tokens in reading order and uppercase them.
pub fn normalize_plate_text(raw: &str) -> String {
    raw.split_whitespace().collect::<String>().to_uppercase()
}

impl PlateReader for CommandPlateReader {
    fn name(&self) -> &'static str {
        "command"
    }

    fn read(&self, crop: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .args(self.args_for(crop))
            .output()
            .with_context(|| format!("failed to run ocr command {}", self.program))?;
        if !output.status.success() {
            return Err(anyhow!(
                "ocr command {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(normalize_plate_text(&String::from_utf8_lossy(&output.stdout)))
    }
}
