use crate::prelude::*;
use clap::Parser;

mod annotations;
mod error;
mod pages;
mod prelude;
mod settings;
mod text;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Extract positioned text from PDF pages and round-trip their annotations"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Settings file (defaults to <config dir>/pagemark/settings.json)
    #[clap(long, env = "PAGEMARK_SETTINGS", global = true)]
    pub(crate) settings: Option<std::path::PathBuf>,

    /// Print tables instead of JSON.
    #[clap(long, global = true, default_value = "false")]
    pub(crate) table: bool,

    /// Whether to display additional information.
    #[clap(long, env = "PAGEMARK_VERBOSE", global = true, default_value = "false")]
    pub(crate) verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Print the positioned text runs of one or every page
    Text(crate::text::TextOptions),

    /// Report whether the document has a text layer
    Searchable(crate::text::SearchableOptions),

    /// Find text runs containing a query (case-insensitive)
    Search(crate::text::SearchOptions),

    /// List the annotations stored in a document
    Annotations(crate::annotations::ListOptions),

    /// Add one annotation to a document
    Add(crate::annotations::AddOptions),

    /// Print the text under a drag rectangle, or mark it with --kind
    Select(crate::annotations::SelectOptions),

    /// Replace a document's annotations with a JSON list
    Save(crate::annotations::SaveOptions),

    /// Write a copy without annotations or OCR layers
    Strip(crate::annotations::StripOptions),

    /// Remove one page
    #[clap(name = "delete-page")]
    DeletePage(crate::pages::DeletePageOptions),

    /// Print the number of pages
    Pages(crate::pages::PagesOptions),

    /// Show or initialise the settings file
    Settings(crate::settings::SettingsOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();

    let default_filter = if app.global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
    color_eyre::install()?;

    let settings_path = crate::settings::settings_path(app.global.settings.as_deref())?;
    let settings = crate::settings::load(&settings_path);
    log::debug!("settings from {}: {:?}", settings_path.display(), settings);

    match app.command {
        SubCommands::Text(options) => crate::text::text(options, app.global, settings).await,
        SubCommands::Searchable(options) => crate::text::searchable(options, app.global, settings),
        SubCommands::Search(options) => crate::text::search(options, app.global, settings).await,
        SubCommands::Annotations(options) => crate::annotations::list(options, app.global),
        SubCommands::Add(options) => crate::annotations::add(options, settings),
        SubCommands::Select(options) => crate::annotations::select(options, app.global, settings),
        SubCommands::Save(options) => crate::annotations::save(options, settings),
        SubCommands::Strip(options) => crate::annotations::strip(options),
        SubCommands::DeletePage(options) => crate::pages::delete_page(options),
        SubCommands::Pages(options) => crate::pages::pages(options, app.global),
        SubCommands::Settings(options) => crate::settings::run(options, app.global, &settings_path, settings),
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
