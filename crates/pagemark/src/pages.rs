use std::path::PathBuf;

use pagemark_pdf::Annotation;

use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
pub struct DeletePageOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Page to remove (1-indexed)
    page: u32,

    /// Annotation list (JSON) to renumber alongside the document
    #[arg(short, long)]
    annotations: Option<PathBuf>,

    /// Write here instead of overwriting the input
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct PagesOptions {
    /// Path to the PDF file
    path: PathBuf,
}

pub fn delete_page(options: DeletePageOptions) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let out = pagemark_pdf::delete_page(&bytes, options.page)?;

    // Sidecar first; the document is only rewritten once both are ready.
    if let Some(sidecar) = &options.annotations {
        let raw =
            std::fs::read_to_string(sidecar).wrap_err_with(|| f!("failed to read {}", sidecar.display()))?;
        let mut annotations: Vec<Annotation> =
            serde_json::from_str(&raw).wrap_err_with(|| f!("malformed annotation list {}", sidecar.display()))?;
        pagemark_pdf::renumber_after_page_delete(&mut annotations, options.page);
        std::fs::write(sidecar, serde_json::to_string_pretty(&annotations)?)
            .wrap_err_with(|| f!("failed to write {}", sidecar.display()))?;
        eprintln!("renumbered {} annotations in {}", annotations.len(), sidecar.display());
    }

    write_document(&options.path, options.output.as_deref(), &out)
}

pub fn pages(options: PagesOptions, global: crate::Global) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let count = pagemark_pdf::page_count(&bytes)?;

    if global.table {
        let mut table = new_table();
        table.add_row(prettytable::row!["File", options.path.display()]);
        table.add_row(prettytable::row!["Pages", count]);
        table.printstd();
    } else {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "pages": count }))?);
    }
    Ok(())
}
