use std::path::PathBuf;
use std::sync::Arc;

use pagemark_pdf::{ExtractOptions, PdfDocument, PositionedTextRun};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::prelude::{println, *};
use crate::settings::Settings;

#[derive(Debug, clap::Args)]
pub struct TextOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Only this page (1-indexed); every page when omitted
    #[arg(short, long)]
    page: Option<u32>,
}

#[derive(Debug, clap::Args)]
pub struct SearchableOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Number of leading pages to check (defaults to the settings value)
    #[arg(short, long)]
    sample: Option<usize>,
}

#[derive(Debug, clap::Args)]
pub struct SearchOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Text to look for
    query: String,
}

#[derive(Debug, Serialize)]
pub struct PageText {
    pub page: u32,
    pub runs: Vec<PositionedTextRun>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub page: u32,
    #[serde(flatten)]
    pub run: PositionedTextRun,
}

/// Extract the requested pages from one parsed document, one blocking task
/// per page.
async fn extract_pages(bytes: Vec<u8>, page: Option<u32>, options: ExtractOptions) -> Result<Vec<PageText>> {
    let doc = PdfDocument::from_bytes(&bytes)?;
    let count = doc.page_count();
    let pages: Vec<u32> = match page {
        Some(p) if p == 0 || p as usize > count => {
            return Err(eyre!(Error::InvalidArgument(f!(
                "page {} is out of range (document has {} pages)",
                p,
                count
            ))))
        }
        Some(p) => vec![p],
        None => (1..=count as u32).collect(),
    };

    let doc = Arc::new(doc);
    let options = Arc::new(options);
    let mut set = JoinSet::new();
    for page in pages {
        let doc = Arc::clone(&doc);
        let options = Arc::clone(&options);
        set.spawn_blocking(move || PageText {
            page,
            runs: doc.page_text(page, &options),
        });
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(result) = set.join_next().await {
        results.push(result.wrap_err("page extraction task failed")?);
    }
    results.sort_by_key(|p| p.page);
    Ok(results)
}

pub async fn text(options: TextOptions, global: crate::Global, settings: Settings) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let pages = extract_pages(bytes, options.page, settings.extract_options()).await?;

    if global.table {
        let mut table = new_table();
        table.add_row(prettytable::row!["Page", "X", "Y", "Width", "Height", "Text"]);
        for page in &pages {
            for run in &page.runs {
                table.add_row(prettytable::row![
                    page.page,
                    f!("{:.1}", run.x),
                    f!("{:.1}", run.y),
                    f!("{:.1}", run.width),
                    f!("{:.1}", run.height),
                    run.text
                ]);
            }
        }
        table.printstd();
    } else {
        println!("{}", serde_json::to_string_pretty(&pages)?);
    }
    Ok(())
}

pub fn searchable(options: SearchableOptions, global: crate::Global, settings: Settings) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let sample = options.sample.unwrap_or(settings.sample_limit);
    let searchable = pagemark_pdf::is_searchable(&bytes, sample);

    if global.table {
        let mut table = new_table();
        table.add_row(prettytable::row!["File", options.path.display()]);
        table.add_row(prettytable::row!["Pages checked", sample]);
        table.add_row(prettytable::row!["Searchable", searchable]);
        table.printstd();
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "searchable": searchable, "sample": sample }))?
        );
    }
    Ok(())
}

pub async fn search(options: SearchOptions, global: crate::Global, settings: Settings) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let pages = extract_pages(bytes, None, settings.extract_options()).await?;

    let hits: Vec<SearchHit> = pages
        .iter()
        .flat_map(|page| {
            pagemark_pdf::selection::search_runs(&page.runs, &options.query)
                .into_iter()
                .map(move |run| SearchHit {
                    page: page.page,
                    run: run.clone(),
                })
        })
        .collect();

    if global.table {
        if hits.is_empty() {
            println!("No matches for {:?}.", options.query);
            return Ok(());
        }
        let mut table = new_table();
        table.add_row(prettytable::row!["Page", "X", "Y", "Text"]);
        for hit in &hits {
            table.add_row(prettytable::row![
                hit.page,
                f!("{:.1}", hit.run.x),
                f!("{:.1}", hit.run.y),
                hit.run.text
            ]);
        }
        table.printstd();
    } else {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    }
    Ok(())
}
