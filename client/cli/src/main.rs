use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod editor;
mod library;
mod model;
mod navigator;
mod tui;
mod upload;
mod watch;

#[cfg(test)]
mod testing;

use api::{ApiClient, MediaStore};
use config::Config;
use editor::{CropRegion, EditorSession};
use library::{AssetView, FetchOutcome, ViewState};
use model::{format_size, FileId, FileMetadataUpdate, FileType, FolderId};
use upload::{resolve_dropped_paths, UploadEvent, UploadPipeline, UploadSource};

#[derive(Parser)]
#[command(name = "mediadesk")]
#[command(about = "Media library client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store server address and access token
    Configure {
        #[arg(long)]
        server: Option<String>,
        /// Prompted without echo when omitted and none is stored
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        api_prefix: Option<String>,
        #[arg(long)]
        page_size: Option<u32>,
        /// 0 disables the client-side size check
        #[arg(long)]
        max_upload_bytes: Option<u64>,
    },
    /// List files
    Ls {
        #[arg(long)]
        folder: Option<i64>,
        /// image, document or other
        #[arg(long = "type", value_parser = parse_file_type)]
        file_type: Option<FileType>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List folders
    Folders {
        #[arg(long)]
        folder: Option<i64>,
    },
    /// Create a folder
    Mkdir {
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Delete an empty folder
    Rmdir { id: i64 },
    /// Delete files
    Rm {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Update file metadata or move it to another folder
    Meta {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        alt: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        folder: Option<i64>,
    },
    /// Upload files or directories, one at a time
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        folder: Option<i64>,
    },
    /// Crop, rotate and scale an image, then upload the result
    Edit {
        /// Remote file id to edit
        #[arg(required_unless_present = "path", conflicts_with = "path")]
        id: Option<i64>,
        /// Local image to edit instead of a remote one
        #[arg(long)]
        path: Option<PathBuf>,
        /// Crop as x,y,width,height in displayed coordinates
        #[arg(long, value_parser = CropRegion::parse)]
        crop: Option<CropRegion>,
        /// Displayed size the crop was drawn against, as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_display_size)]
        display: Option<(f64, f64)>,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rotate: f64,
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        /// Destination folder for the result
        #[arg(long)]
        folder: Option<i64>,
        /// Write the JPEG here instead of uploading it
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Upload files as they appear in a directory
    Watch {
        dir: PathBuf,
        #[arg(long)]
        folder: Option<i64>,
    },
    /// Interactive browser
    Browse,
}

fn parse_file_type(s: &str) -> Result<FileType, String> {
    FileType::parse(s).ok_or_else(|| format!("unknown file type '{}' (image, document, other)", s))
}

fn parse_display_size(s: &str) -> Result<(f64, f64), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("display size must be WIDTHxHEIGHT, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| format!("invalid display size '{}'", s))
    };
    Ok((parse(w)?, parse(h)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // The browser owns the terminal, so it runs without a log subscriber
    match &cli.command {
        Some(Commands::Browse) => {
            config.require_auth()?;
            return tui::run_browser(&config).await;
        }
        None => {
            if config.is_configured() {
                return tui::run_browser(&config).await;
            }
            println!("not configured. run: mediadesk configure --server <url>");
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging for foreground commands
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediadesk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Some(Commands::Configure {
            server,
            token,
            api_prefix,
            page_size,
            max_upload_bytes,
        }) => {
            configure(server, token, api_prefix, page_size, max_upload_bytes)?;
        }
        Some(Commands::Ls {
            folder,
            file_type,
            search,
            page,
        }) => {
            list_files(&config, folder, file_type, search, page).await?;
        }
        Some(Commands::Folders { folder }) => {
            list_folders(&config, folder).await?;
        }
        Some(Commands::Mkdir { name, parent }) => {
            make_folder(&config, &name, parent).await?;
        }
        Some(Commands::Rmdir { id }) => {
            let client = connect(&config)?;
            let mut view = AssetView::new(config.page_size());
            view.delete_folder(&client, FolderId(id)).await?;
            println!("deleted folder {}", id);
        }
        Some(Commands::Rm { ids }) => {
            remove_files(&config, &ids).await?;
        }
        Some(Commands::Meta {
            id,
            title,
            alt,
            description,
            folder,
        }) => {
            let update = FileMetadataUpdate {
                folder_id: folder.map(FolderId),
                alt_text: alt,
                title,
                description,
            };
            if update.is_empty() {
                anyhow::bail!("nothing to update. pass --title, --alt, --description or --folder");
            }
            let client = connect(&config)?;
            let file = client.update_file(FileId(id), &update).await?;
            println!("updated {} ({})", file.original_filename, file.id);
        }
        Some(Commands::Upload { paths, folder }) => {
            upload(&config, &paths, folder.map(FolderId)).await?;
        }
        Some(Commands::Edit {
            id,
            path,
            crop,
            display,
            rotate,
            scale,
            folder,
            output,
        }) => {
            let options = EditOptions {
                crop,
                display,
                rotate,
                scale,
            };
            edit(&config, id.map(FileId), path, options, folder.map(FolderId), output).await?;
        }
        Some(Commands::Watch { dir, folder }) => {
            let client = connect(&config)?;
            watch::watch_inbox(&client, &dir, folder.map(FolderId), config.max_upload_bytes()).await?;
        }
        Some(Commands::Browse) | None => unreachable!(),
    }

    Ok(())
}

fn connect(config: &Config) -> anyhow::Result<ApiClient> {
    config.require_auth()?;
    ApiClient::from_config(config)
}

fn configure(
    server: Option<String>,
    token: Option<String>,
    api_prefix: Option<String>,
    page_size: Option<u32>,
    max_upload_bytes: Option<u64>,
) -> anyhow::Result<()> {
    let path = Config::config_path()?;
    let mut config = if path.exists() {
        Config::from_toml(&std::fs::read_to_string(&path)?)?
    } else {
        Config::default()
    };

    let token = match token {
        Some(token) => Some(token),
        None if config.token.is_none() => {
            let token = rpassword::prompt_password("access token: ")?;
            Some(token)
        }
        None => None,
    };
    config.apply_overrides(server, token);
    if let Some(prefix) = api_prefix {
        config.api_prefix = Some(prefix);
    }
    if let Some(size) = page_size {
        config.page_size = Some(size);
    }
    if let Some(limit) = max_upload_bytes {
        config.max_upload_bytes = Some(limit);
    }
    config.save()?;

    println!("saved {}", path.display());
    match &config.server_url {
        Some(server) => println!("server: {}{}", server, config.api_prefix()),
        None => println!("no server set. run: mediadesk configure --server <url>"),
    }
    Ok(())
}

async fn list_files(
    config: &Config,
    folder: Option<i64>,
    file_type: Option<FileType>,
    search: Option<String>,
    page: u32,
) -> anyhow::Result<()> {
    let client = connect(config)?;

    let mut state = ViewState::new(config.page_size());
    if let Some(id) = folder {
        state.enter_folder_id(FolderId(id));
    }
    state.set_file_type(file_type);
    state.set_search(search.as_deref().unwrap_or(""));
    state.set_page(page);

    let mut view = AssetView::with_state(state);
    if view.refresh(&client).await == FetchOutcome::Failed {
        anyhow::bail!(view.last_error().unwrap_or("listing failed").to_string());
    }

    for folder in view.folders() {
        println!("{:>10}  {}/  ({})", "", folder.name, folder.id);
    }
    if view.files().is_empty() {
        println!("no files");
        return Ok(());
    }
    for file in view.files() {
        println!(
            "{:>10}  {:<9} {}  ({})",
            format_size(file.file_size),
            file.file_type.as_str(),
            file.original_filename,
            file.id
        );
    }
    println!(
        "page {}/{}, {} files",
        view.state().page(),
        view.total_pages().max(1),
        view.total()
    );
    Ok(())
}

async fn list_folders(config: &Config, parent: Option<i64>) -> anyhow::Result<()> {
    let client = connect(config)?;
    let folders = client.list_folders(parent.map(FolderId)).await?;

    if folders.is_empty() {
        println!("no folders");
        return Ok(());
    }
    for folder in folders {
        println!(
            "{:>6}  {}  ({} files, {} folders)",
            folder.id, folder.name, folder.file_count, folder.subfolder_count
        );
    }
    Ok(())
}

async fn make_folder(config: &Config, name: &str, parent: Option<i64>) -> anyhow::Result<()> {
    let client = connect(config)?;
    let mut view = AssetView::new(config.page_size());
    if let Some(id) = parent {
        view.state_mut().enter_folder_id(FolderId(id));
    }
    let folder = view.create_folder(&client, name).await?;
    println!("created folder {} ({})", folder.name, folder.id);
    Ok(())
}

async fn remove_files(config: &Config, ids: &[i64]) -> anyhow::Result<()> {
    let client = connect(config)?;
    let mut view = AssetView::new(config.page_size());
    let mut failed = 0;
    for id in ids {
        match view.delete_file(&client, FileId(*id)).await {
            Ok(()) => println!("deleted {}", id),
            Err(e) => {
                eprintln!("! {}: {}", id, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} deletions failed", failed, ids.len());
    }
    Ok(())
}

async fn upload(config: &Config, paths: &[PathBuf], folder_id: Option<FolderId>) -> anyhow::Result<()> {
    let client = connect(config)?;
    let sources = resolve_dropped_paths(paths);
    if sources.is_empty() {
        println!("nothing to upload");
        return Ok(());
    }
    run_batch(&client, sources, folder_id, config.max_upload_bytes()).await
}

async fn run_batch(
    client: &ApiClient,
    sources: Vec<UploadSource>,
    folder_id: Option<FolderId>,
    max_bytes: Option<u64>,
) -> anyhow::Result<()> {
    let total = sources.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:30.blue} {pos}/{len} {msg}")?
            .progress_chars("█▓▒░  "),
    );

    let pipeline = UploadPipeline::new(client, folder_id).with_size_limit(max_bytes);
    let report = pipeline
        .upload_batch(sources, |event| match event {
            UploadEvent::Started { name, .. } => pb.set_message(name.clone()),
            UploadEvent::Succeeded { file } => {
                pb.println(format!("  uploaded {} ({})", file.original_filename, file.id));
                pb.inc(1);
            }
            UploadEvent::Failed { name, error } => {
                pb.println(format!("  ! {}: {}", name, error));
                pb.inc(1);
            }
        })
        .await;
    pb.finish_and_clear();

    println!("{}", report.summary());
    if !report.is_clean() {
        anyhow::bail!("{} of {} uploads failed", report.failed.len(), total);
    }
    Ok(())
}

struct EditOptions {
    crop: Option<CropRegion>,
    display: Option<(f64, f64)>,
    rotate: f64,
    scale: f64,
}

async fn edit(
    config: &Config,
    id: Option<FileId>,
    path: Option<PathBuf>,
    options: EditOptions,
    folder_id: Option<FolderId>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut session = EditorSession::new();
    let mut destination = folder_id;

    match (id, &path) {
        (_, Some(path)) => session.load_path(path)?,
        (Some(id), None) => {
            let client = connect(config)?;
            let file = client.get_file(id).await?;
            if !file.is_image() {
                anyhow::bail!("{} is not an image", file.original_filename);
            }
            let bytes = client.download(&file).await?;
            session.load_bytes(&bytes)?;
            destination = destination.or(file.folder_id);
        }
        (None, None) => anyhow::bail!("pass a file id or --path"),
    }

    if let Some((w, h)) = options.display {
        session.set_displayed_size(w, h)?;
    }
    if let Some(crop) = options.crop {
        session.set_crop(crop)?;
    }
    session.set_rotation(options.rotate)?;

    // Any positive scale is accepted here, unlike the interactive slider.
    let Some(source) = session.source() else {
        anyhow::bail!("image not loaded");
    };
    let Some(encoded) = editor::edit(source, session.crop(), session.rotation(), options.scale)? else {
        anyhow::bail!("crop is smaller than one pixel, nothing to save");
    };
    tracing::info!("Encoded {} ({} bytes)", encoded.filename, encoded.bytes.len());

    if let Some(output) = output {
        std::fs::write(&output, &encoded.bytes)?;
        println!("wrote {}", output.display());
        return Ok(());
    }

    let client = connect(config)?;
    run_batch(
        &client,
        vec![UploadSource::Encoded(encoded)],
        destination,
        config.max_upload_bytes(),
    )
    .await
}
