pub use crate::error::Error;

pub use anstream::eprintln;
pub use anstream::println;
pub use color_eyre::eyre::{eyre, Context, OptionExt, Result};
pub use std::format as f;

pub fn new_table() -> prettytable::Table {
    let mut table = prettytable::Table::new();

    let format = prettytable::format::FormatBuilder::new()
        .padding(1, 1)
        .build();

    table.set_format(format);

    table
}

/// Write `bytes` to `output`, or over `input` when no output was given.
/// Only called once the new document is fully built.
pub fn write_document(input: &std::path::Path, output: Option<&std::path::Path>, bytes: &[u8]) -> Result<()> {
    let target = output.unwrap_or(input);
    std::fs::write(target, bytes).wrap_err_with(|| f!("failed to write {}", target.display()))?;
    eprintln!("wrote {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}

/// Read a document into memory.
pub fn read_document(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).wrap_err_with(|| f!("failed to read {}", path.display()))
}
