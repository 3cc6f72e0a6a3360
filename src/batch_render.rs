//! Batch render setup: joins per-shot render command files into one batch file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

/// Render the batch text: each input's trimmed content on its own line
pub fn build_batch<P: AsRef<Path>>(inputs: &[P]) -> Result<String> {
    let mut batch = String::new();
    for input in inputs {
        let input = input.as_ref();
        let command = fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        batch.push_str(command.trim());
        batch.push('\n');
    }
    Ok(batch)
}

/// Write the batch file; nothing is written if any input can't be read.
pub fn generate_batch_file<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<PathBuf> {
    if inputs.is_empty() {
        bail!("No text files selected.");
    }
    if output.as_os_str().is_empty() {
        bail!("No save location specified.");
    }

    let batch = build_batch(inputs)?;
    fs::write(output, batch)
        .with_context(|| format!("Failed to generate batch file: {}", output.display()))?;

    info!(
        output = %output.display(),
        commands = inputs.len(),
        "Batch file generated"
    );
    Ok(output.to_path_buf())
}
