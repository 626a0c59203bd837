use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pdfpeek::config::Config;
use pdfpeek::error::{AppError, AppResult};
use pdfpeek::render::PageImage;
use pdfpeek::search::{SearchMatch, SearchMode};
use pdfpeek::session::{OpenOptions, SharedSession};
use pdfpeek::source::DocumentSource;
use pdfpeek::surface::ImageEncoding;

/// Inspect PDF documents: metadata, page text, rendering and context search
#[derive(Debug, Parser)]
#[command(name = "pdfpeek")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print page count and document metadata
    Info {
        #[command(flatten)]
        doc: DocArgs,

        #[arg(long)]
        json: bool,
    },

    /// Print the extracted text of one page
    Text {
        #[command(flatten)]
        doc: DocArgs,

        #[arg(short, long)]
        page: usize,
    },

    /// Render pages to image files
    Render {
        #[command(flatten)]
        doc: DocArgs,

        /// Render only this page (1-based); all pages otherwise
        #[arg(short, long)]
        page: Option<usize>,

        #[arg(short, long)]
        scale: Option<f32>,

        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Search page text and print each match with its context
    Search {
        #[command(flatten)]
        doc: DocArgs,

        query: String,

        /// Characters of context on each side of a match
        #[arg(long)]
        context: Option<usize>,

        /// Match the query literally instead of as a pattern
        #[arg(long)]
        literal: bool,

        /// Search only this page (1-based)
        #[arg(short, long)]
        page: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct DocArgs {
    /// PDF path, data: URL, or `-` for stdin
    input: String,

    #[arg(long)]
    password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for ImageEncoding {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Png => ImageEncoding::Png,
            FormatArg::Jpeg => ImageEncoding::Jpeg,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let mut options = config.open_options();

    match cli.command {
        Command::Info { doc, json } => {
            let session = open(doc, options).await?;
            print_info(&session, json)
        }
        Command::Text { doc, page } => {
            let session = open(doc, options).await?;
            println!("{}", session.page_text(page).await?);
            Ok(())
        }
        Command::Render {
            doc,
            page,
            scale,
            format,
            out,
        } => {
            if scale.is_some() {
                options.scale = scale;
            }
            if let Some(format) = format {
                options.encoding = format.into();
            }
            let out = out.unwrap_or_else(|| config.output.directory.clone());
            let session = open(doc, options).await?;
            render(&session, page, &out).await
        }
        Command::Search {
            doc,
            query,
            context,
            literal,
            page,
            json,
        } => {
            if context.is_some() {
                options.search_view_length = context;
            }
            if literal {
                options.search_mode = SearchMode::Literal;
            }
            let session = open(doc, options).await?;
            let matches = match page {
                Some(page) => session
                    .search_page(page, query)
                    .await?
                    .into_iter()
                    .map(|window| SearchMatch {
                        page_number: page,
                        window,
                    })
                    .collect(),
                None => session.search(query).await?,
            };
            print_matches(&matches, json)
        }
    }
}

async fn open(doc: DocArgs, mut options: OpenOptions) -> AppResult<SharedSession> {
    options.password = doc.password;
    SharedSession::open(DocumentSource::from_arg(&doc.input), options).await
}

fn print_info(session: &SharedSession, json: bool) -> AppResult<()> {
    if json {
        let value = serde_json::json!({
            "pages": session.page_count(),
            "metadata": session.metadata(),
        });
        println!("{}", to_json(&value)?);
        return Ok(());
    }

    println!("Pages: {}", session.page_count());
    for (key, value) in session.metadata().iter() {
        println!("{key}: {value}");
    }
    Ok(())
}

fn print_matches(matches: &[SearchMatch], json: bool) -> AppResult<()> {
    if json {
        println!("{}", to_json(matches)?);
        return Ok(());
    }

    for found in matches {
        println!("{}: {}", found.page_number, found.window);
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| AppError::invalid_argument(format!("failed to encode json: {err}")))
}

async fn render(session: &SharedSession, page: Option<usize>, out: &Path) -> AppResult<()> {
    fs::create_dir_all(out).map_err(|source| {
        AppError::io_with_context(
            source,
            format!("failed to create output directory: {}", out.display()),
        )
    })?;

    if let Some(page) = page {
        let image = session.get_page(page).await?;
        return write_image(&image, out);
    }

    let mut pages = Box::pin(session.pages());
    while let Some(image) = pages.next().await {
        write_image(&image?, out)?;
    }
    Ok(())
}

fn write_image(image: &PageImage, out: &Path) -> AppResult<()> {
    let path = out.join(image_file_name(image.page_number, image.encoding));
    fs::write(&path, &image.data).map_err(|source| {
        AppError::io_with_context(source, format!("failed to write {}", path.display()))
    })?;
    info!(
        page = image.page_number,
        width = image.width,
        height = image.height,
        path = %path.display(),
        "wrote page image"
    );
    Ok(())
}

fn image_file_name(page_number: usize, encoding: ImageEncoding) -> String {
    format!("page-{page_number:04}.{}", encoding.extension())
}
