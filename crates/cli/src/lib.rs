use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagemark_core::{EditScript, EditorConfig, EditorSession, SystemTextEngine};
use pagemark_engine::{default_engine, DocumentEngine, LopdfEngine, OpenSource};
use pagemark_storage::ConfigStore;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pagemark")]
#[command(about = "Pagemark PDF overlay editor")]
pub struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a page with its edits to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Defaults to the configured initial zoom.
        #[arg(long)]
        zoom: Option<f32>,
        /// JSON edit script to apply before rendering.
        #[arg(long, value_name = "JSON")]
        edits: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Bake edits into a new PDF.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "JSON")]
        edits: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Extract an inclusive page range.
    Split {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Concatenate PDFs in order.
    Merge {
        #[arg(value_name = "FILES", required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the effective editor config.
    Config {
        /// Print where the config file lives instead.
        #[arg(long)]
        path: bool,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    number: u32,
    width: f32,
    height: f32,
    rotation: u16,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    output: String,
    pages: u32,
    removed_items: usize,
    overlays: usize,
    skipped: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, page, zoom, edits, output } => {
            let config = load_config(config_file)?;
            run_render(&file, page, zoom, edits.as_deref(), output.as_deref(), config)
        }
        Commands::Export { file, edits, output } => {
            let config = load_config(config_file)?;
            run_export(&file, edits.as_deref(), &output, config)
        }
        Commands::Split { file, from, to, output } => run_split(&file, from, to, &output),
        Commands::Merge { files, output } => run_merge(&files, &output),
        Commands::Config { path } => run_config(config_file, path),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<EditorConfig> {
    if let Some(path) = explicit {
        return pagemark_storage::load_file(path)
            .with_context(|| format!("failed to read config {}", path.display()));
    }

    match ConfigStore::from_default_project() {
        Ok(store) => store.load().context("failed to read config"),
        Err(err) => {
            log::warn!("{err}; using default config");
            Ok(EditorConfig::default())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let mut pages = Vec::with_capacity(page_count as usize);
    for page_index in 0..page_count {
        let size = engine.page_size(handle, page_index)?;
        let rotation = engine.rotation(handle, page_index)?;
        pages.push(PageOutput {
            number: page_index + 1,
            width: size.width_pt,
            height: size.height_pt,
            rotation: rotation.degrees(),
        });
    }

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn open_session(
    file: &Path,
    edits: Option<&Path>,
    config: EditorConfig,
) -> Result<EditorSession<LopdfEngine, SystemTextEngine>> {
    ensure_pdf_exists(file)?;

    let mut session = EditorSession::new(default_engine(), SystemTextEngine::new(), config);
    session.open(file).context("failed to open PDF")?;

    if let Some(edits) = edits {
        let script = EditScript::load(edits)
            .with_context(|| format!("failed to read edits from {}", edits.display()))?;
        let count = session.apply_script(&script).context("failed to apply edits")?;
        log::info!("applied {count} annotation(s) from {}", edits.display());
    }

    Ok(session)
}

fn run_render(
    file: &Path,
    page: u32,
    zoom: Option<f32>,
    edits: Option<&Path>,
    output: Option<&Path>,
    config: EditorConfig,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let mut session = open_session(file, edits, config)?;
    if let Some(zoom) = zoom {
        session.set_zoom(zoom);
    }
    session.go_to_page(page - 1)?;

    let image = session.render().context("failed to render page")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));
    ensure_parent(&output)?;

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_export(file: &Path, edits: Option<&Path>, output: &Path, config: EditorConfig) -> Result<()> {
    let mut session = open_session(file, edits, config)?;
    ensure_parent(output)?;

    let summary = session
        .export_to(output)
        .with_context(|| format!("failed to export to {}", output.display()))?;

    let payload = ExportOutput {
        output: output.display().to_string(),
        pages: summary.pages,
        removed_items: summary.removed_items,
        overlays: summary.overlays,
        skipped: summary.skipped,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn run_split(file: &Path, from: u32, to: u32, output: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    if from == 0 || to == 0 {
        anyhow::bail!("--from and --to are 1-based and must be >= 1");
    }

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let extracted = pagemark_engine::split(&bytes, from - 1, to - 1).context("failed to split PDF")?;
    write_output(output, &extracted)
}

fn run_merge(files: &[PathBuf], output: &Path) -> Result<()> {
    let mut sources = Vec::with_capacity(files.len());
    for file in files {
        ensure_pdf_exists(file)?;
        sources.push(fs::read(file).with_context(|| format!("failed to read {}", file.display()))?);
    }

    let merged = pagemark_engine::merge(&sources).context("failed to merge PDFs")?;
    write_output(output, &merged)
}

fn run_config(explicit: Option<&Path>, print_path: bool) -> Result<()> {
    if print_path {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => ConfigStore::from_default_project()?.config_path(),
        };
        println!("{}", path.display());
        return Ok(());
    }

    let config = load_config(explicit)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn write_output(output: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(output)?;
    fs::write(output, bytes).with_context(|| format!("failed to write {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
