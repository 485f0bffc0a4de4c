//! User settings: defaults for new annotations and extraction knobs, stored
//! as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use pagemark_pdf::{
    Annotation, AnnotationKind, ExtractOptions, FontChain, Rgb, SaveOptions, ViewerRect, DEFAULT_FONT_FAMILY,
    DEFAULT_FONT_SIZE,
};
use serde::{Deserialize, Serialize};

use crate::prelude::{eprintln, println, *};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub font_family: String,
    pub font_size: u32,
    pub color: Rgb,
    pub bold: bool,
    /// Pages sampled by the searchability check.
    pub sample_limit: usize,
    pub max_form_depth: usize,
    /// Replaces the built-in font chain when set.
    pub fonts: Option<FontChain>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            color: Rgb::BLACK,
            bold: false,
            sample_limit: pagemark_pdf::ocr::DEFAULT_SAMPLE_LIMIT,
            max_form_depth: ExtractOptions::default().max_form_depth,
            fonts: None,
        }
    }
}

impl Settings {
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            max_form_depth: self.max_form_depth,
        }
    }

    pub fn save_options(&self, scale: f64) -> SaveOptions {
        SaveOptions {
            scale,
            fonts: self.fonts.clone().unwrap_or_default(),
        }
    }

    /// A new annotation carrying the configured text defaults. Markup kinds
    /// keep their own colour.
    pub fn annotation(&self, kind: AnnotationKind, page: u32, rect: ViewerRect) -> Annotation {
        let mut annotation = Annotation::new(kind, page, rect);
        annotation.font_family = self.font_family.clone();
        annotation.font_size = self.font_size;
        annotation.bold = self.bold;
        if kind == AnnotationKind::FreeText {
            annotation.color = self.color;
        }
        annotation
    }
}

/// Resolve where settings live: an explicit path, else the user config dir.
pub fn settings_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let dir = dirs_next::config_dir().ok_or_else(|| eyre!("Unable to determine config directory"))?;
    Ok(dir.join("pagemark").join("settings.json"))
}

/// Load settings. A missing file means defaults; an unreadable or malformed
/// one is reported and also falls back to defaults.
pub fn load(path: &Path) -> Settings {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(e) => {
            log::warn!("cannot read settings {}: {}, using defaults", path.display(), e);
            return Settings::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::warn!("malformed settings {}: {}, using defaults", path.display(), e);
        Settings::default()
    })
}

pub fn save(path: &Path, settings: &Settings) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Settings(f!("cannot create {}: {}", parent.display(), e)))?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(|e| Error::Settings(e.to_string()))?;
    fs::write(path, json).map_err(|e| Error::Settings(f!("cannot write {}: {}", path.display(), e)))
}

#[derive(Debug, clap::Args)]
pub struct SettingsOptions {
    /// Write the default settings file
    #[arg(long)]
    init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    force: bool,
}

pub fn run(options: SettingsOptions, global: crate::Global, path: &Path, settings: Settings) -> Result<()> {
    if options.init {
        if path.exists() && !options.force {
            return Err(eyre!(Error::Settings(f!(
                "{} already exists, use --force to overwrite",
                path.display()
            ))));
        }
        save(path, &Settings::default())?;
        eprintln!("wrote default settings to {}", path.display());
        return Ok(());
    }

    if global.table {
        let chain = if settings.fonts.is_some() { "custom" } else { "built-in" };
        let mut table = new_table();
        table.add_row(prettytable::row!["File", path.display()]);
        table.add_row(prettytable::row!["Font family", settings.font_family]);
        table.add_row(prettytable::row!["Font size", settings.font_size]);
        table.add_row(prettytable::row!["Colour", settings.color]);
        table.add_row(prettytable::row!["Bold", settings.bold]);
        table.add_row(prettytable::row!["Sample limit", settings.sample_limit]);
        table.add_row(prettytable::row!["Max form depth", settings.max_form_depth]);
        table.add_row(prettytable::row!["Font chain", chain]);
        table.printstd();
    } else {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    }
    Ok(())
}
