//! DriveKit CLI: browse and transfer files on a drive
//!
//! Usage:
//!   drivekit-cli ls [path]              List a folder
//!   drivekit-cli put <local> [folder]   Upload a file into a folder
//!   drivekit-cli get <remote>           Download a file
//!   drivekit-cli mkdir <path>           Create a folder
//!   drivekit-cli clean                  Wipe cached files and sign out
//!
//! The access token is read from `DRIVEKIT_ACCESS_TOKEN`.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use drivekit::config::{self, DriveKitConfig};
use drivekit::providers::LocalDriveFactory;
use drivekit::{
    AuthSession, ChannelNotifier, DownloadsFolder, DriveServices, LocalStorage, ScreenController,
    StaticTokenProvider, TransferResult, UserIntent,
};

#[derive(Parser)]
#[command(
    name = "drivekit-cli",
    about = "DriveKit CLI: browse, upload and download drive files",
    version
)]
struct Cli {
    /// Config file (default: <config dir>/drivekit/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the drive root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Override the log level
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List folders and files
    Ls {
        /// Folder path, `/` separated (default: root)
        #[arg(default_value = "")]
        path: String,
    },
    /// Upload a local file
    Put {
        /// Local file
        local: PathBuf,
        /// Destination folder path (default: root)
        #[arg(default_value = "")]
        folder: String,
    },
    /// Download a file into the downloads directory
    Get {
        /// Remote file path, `/` separated
        remote: String,
    },
    /// Create a folder
    Mkdir {
        /// Folder path; parents must exist
        path: String,
    },
    /// Remove staged and app-private files and sign out
    Clean,
}

struct App {
    controller: ScreenController,
    messages: mpsc::UnboundedReceiver<String>,
}

impl App {
    fn new(config: &DriveKitConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.drive_root)
            .with_context(|| format!("Failed to create drive root {:?}", config.drive_root))?;

        let provider = StaticTokenProvider::new(&config.union_id, config::access_token_from_env());
        let session = Arc::new(AuthSession::new(Arc::new(provider)));
        let (notifier, messages) = ChannelNotifier::new();

        let controller = ScreenController::new(
            session,
            Arc::new(LocalDriveFactory::new(config.drive_root.clone())),
            Arc::new(notifier),
            LocalStorage::new(config.cache_dir.clone(), config.files_dir.clone()),
            Arc::new(DownloadsFolder::new(config.downloads_dir.clone())),
            config.transfer_policy(),
        );
        Ok(Self {
            controller,
            messages,
        })
    }

    /// Run one intent, then print whatever it reported
    async fn run(&mut self, intent: UserIntent) -> Result<()> {
        let result = self.controller.dispatch(intent).await?;
        while let Ok(message) = self.messages.try_recv() {
            println!("{}", message);
        }
        result.map_err(|e| anyhow!(e))
    }

    async fn services(&self) -> Result<Arc<DriveServices>> {
        self.controller
            .services()
            .await
            .ok_or_else(|| anyhow!("not signed in"))
    }

    /// Walk down `path` from the root, one folder click per segment
    async fn open_folder(&mut self, path: &str) -> Result<()> {
        for segment in segments(path) {
            let services = self.services().await?;
            let index = services
                .navigation()
                .snapshot()
                .folders
                .iter()
                .position(|f| f.file_name == segment)
                .ok_or_else(|| anyhow!("No folder named '{}'", segment))?;
            self.run(UserIntent::FolderClicked(index)).await?;
        }
        Ok(())
    }

    /// Run a transfer intent with a progress bar
    async fn run_transfer(&mut self, intent: UserIntent) -> Result<()> {
        let services = self.services().await?;
        let mut events = services.transfers().progress_events();
        let bar = ProgressBar::new(100);
        bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}%")?);

        let progress = {
            let bar = bar.clone();
            tokio::spawn(async move {
                while let Ok(fraction) = events.recv().await {
                    bar.set_position((fraction * 100.0).round() as u64);
                    if fraction >= 1.0 {
                        break;
                    }
                }
            })
        };

        let outcome = self.run(intent).await;
        progress.abort();
        bar.finish_and_clear();
        outcome?;

        match services.transfers().state().map(|s| s.result) {
            Some(TransferResult::Failure(message)) => bail!(message),
            _ => Ok(()),
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Split `a/b/c` into (`a/b`, `c`)
fn split_parent(path: &str) -> Result<(String, String)> {
    let mut parts = segments(path);
    let name = parts
        .pop()
        .ok_or_else(|| anyhow!("Path must name an entry"))?
        .to_string();
    Ok((parts.join("/"), name))
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    if let Some(root) = cli.root {
        config.drive_root = root;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config::validate_config(&config).map_err(|e| anyhow!(e))?;
    drivekit::logging::init_logging(&config.log_level);

    let mut app = App::new(&config)?;

    if let Commands::Clean = cli.command {
        return app.run(UserIntent::Exit).await;
    }

    app.run(UserIntent::SignIn).await?;

    match cli.command {
        Commands::Ls { path } => {
            app.run(UserIntent::OpenDownloads).await?;
            app.open_folder(&path).await?;
            let view = app.services().await?.navigation().snapshot();
            for folder in &view.folders {
                println!("{}/", folder.file_name);
            }
            for file in &view.files {
                println!("{:>12}  {}", file.size.unwrap_or(0), file.file_name);
            }
        }
        Commands::Put { local, folder } => {
            app.run(UserIntent::FilePicked {
                path: local,
                display_name: None,
            })
            .await?;
            app.open_folder(&folder).await?;
            app.run_transfer(UserIntent::Submit).await?;
        }
        Commands::Get { remote } => {
            let (parent, name) = split_parent(&remote)?;
            app.run(UserIntent::OpenDownloads).await?;
            app.open_folder(&parent).await?;
            let index = app
                .services()
                .await?
                .navigation()
                .snapshot()
                .files
                .iter()
                .position(|f| f.file_name == name)
                .ok_or_else(|| anyhow!("No file named '{}'", name))?;
            app.run_transfer(UserIntent::FileClicked(index)).await?;
        }
        Commands::Mkdir { path } => {
            let (parent, name) = split_parent(&path)?;
            app.run(UserIntent::OpenDownloads).await?;
            app.open_folder(&parent).await?;
            app.run(UserIntent::CreateFolder(name)).await?;
        }
        Commands::Clean => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
