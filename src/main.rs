use anyhow::{Context, Result, bail};
use autumnus::{FormatterOption, Options, highlight, themes};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{ArgValueCompleter, CompletionCandidate};
use email_address::EmailAddress;
use iocraft::prelude::*;
use serde_json::Value;
use std::{
    future::Future,
    io::{self, Write},
    path::PathBuf,
};
use tokio::{runtime::Handle, sync::watch};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::{
    client::CelebrationClient,
    config::Config,
    error::{ClientError, ClientResult},
    keepalive::KeepAlive,
    media::{MediaFile, format_file_size},
    page::{LoadOptions, Page, SECTION_TAGS},
    rest_types::{
        Acknowledgement, CancellationRequest, DonationIntentRequest, DriveFolder, DriveImage,
        GalleryFolder, GalleryImage, MemoryType, NewMessage, PastMemory, TextMemory,
    },
    ui::{
        ConfigHeader, ErrorMessage, InputPrompt, MemoryList, MessageList, PageView, ProgressBar,
        RowList, StatsPanel, SuccessMessage,
    },
};

mod client;
mod config;
mod error;
mod keepalive;
mod media;
mod page;
mod rest_types;
mod serde_utils;
mod ui;

#[derive(Parser)]
#[command(name = "celebrate")]
#[command(version)]
#[command(about = "A tool for interacting with the celebration website backend")]
struct Cli {
    /// Backend base URL, overriding the configured one
    #[arg(long, global = true, value_hint = ValueHint::Url)]
    base_url: Option<Url>,
    /// Log request details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CancellationArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: EmailAddress,
    #[arg(long, default_value = "")]
    phone: String,
    /// Full cancellation or a reduced number of guests
    #[arg(long, default_value = "full")]
    request_type: String,
    #[arg(long, default_value_t = 0)]
    guests: u32,
    #[arg(long)]
    reason: String,
    /// Interested in joining over Zoom instead
    #[arg(long)]
    zoom_interest: bool,
    /// Keep receiving event updates
    #[arg(long)]
    future_updates: bool,
}

#[derive(Args)]
struct DonateArgs {
    /// Amount in pounds
    amount: f64,
    #[arg(short, long)]
    name: String,
    #[arg(short, long)]
    email: EmailAddress,
    #[arg(long)]
    charity_id: Option<String>,
    #[arg(long)]
    charity_name: Option<String>,
    #[arg(short, long)]
    message: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cancel or reduce a reservation
    CancelReservation(CancellationArgs),
    /// Configure celebrate interactively
    Config,
    /// Mark a donation as completed
    ConfirmDonation { payment_intent_id: String },
    /// Start a donation and print the checkout link
    Donate(DonateArgs),
    /// List external gallery folders
    DriveFolders,
    /// List images in an external gallery folder
    DriveImages { folder_id: String },
    /// Sync the external gallery into the site gallery
    DriveSync {
        #[arg(long)]
        folder_id: Option<String>,
    },
    /// List gallery folders
    Folders,
    /// GET any endpoint and print the JSON response
    Get {
        path: String,
        /// Query parameters as key=value
        #[arg(value_parser = parse_query_pair)]
        params: Vec<(String, String)>,
    },
    /// Check that the backend is up
    Health,
    /// List images in a gallery folder
    Images {
        #[arg(add = ArgValueCompleter::new(folder_completer))]
        folder: String,
    },
    /// Ping the backend periodically so it does not go to sleep
    KeepAlive {
        #[arg(short, long, default_value = "14m")]
        interval: humantime::Duration,
        /// Consecutive failures before raising an alert
        #[arg(long, default_value_t = keepalive::DEFAULT_FAILURE_THRESHOLD)]
        failure_threshold: u32,
        /// Give up on a single ping after this long
        #[arg(long, default_value = "10s")]
        ping_timeout: humantime::Duration,
        /// POST a JSON alert here when the failure threshold is reached
        #[arg(long, value_hint = ValueHint::Url)]
        webhook_url: Option<Url>,
        /// Stop after this many pings
        #[arg(short, long)]
        count: Option<u64>,
    },
    /// List shared memories
    Memories {
        #[arg(short = 't', long = "type")]
        kind: Option<MemoryType>,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// List guestbook messages
    Messages {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// Show the celebration page: stats, messages and memories
    Page {
        /// Section to show instead of the overview
        #[arg(short, long)]
        section: Option<String>,
        /// List every section instead of the tab bar
        #[arg(short, long)]
        menu: bool,
    },
    /// Leave a guestbook message
    PostMessage {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        relationship: String,
        message: String,
    },
    /// Share a memory from the past
    SharePast {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        relationship: String,
        #[arg(short, long)]
        year: Option<String>,
        memory: String,
    },
    /// Compress and upload photos
    SharePhotos {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        caption: String,
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        photos: Vec<PathBuf>,
    },
    /// Share a written memory
    ShareText {
        #[arg(short, long)]
        name: String,
        message: String,
    },
    /// Upload a video
    ShareVideo {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        caption: String,
        #[arg(value_hint = ValueHint::FilePath)]
        video: PathBuf,
    },
    /// Show donation and sharing statistics
    Stats,
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    init_logging(cli.verbose, matches!(cli.command, Commands::KeepAlive { .. }));

    rt.block_on(async {
        match cli.command {
            Commands::Config => interactive_config(),
            command => {
                let config = config::read_config().context("Unable to load configuration")?;
                let base_url = cli.base_url.unwrap_or_else(|| config.base_url.clone());
                let client = CelebrationClient::new(base_url)
                    .with_timeouts(config.request_timeout, config.upload_timeout);

                run_command(&client, &config, command).await
            }
        }
    })
}

fn init_logging(verbose: bool, long_running: bool) {
    let default_filter = if verbose {
        "celebrate=debug"
    } else if long_running {
        "celebrate=info"
    } else {
        "celebrate=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .without_time()
        .init();
}

async fn run_command(client: &CelebrationClient, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Page { section, menu } => show_page(client, config, section, menu).await,
        Commands::Messages { limit, offset } => list_messages(client, limit, offset).await,
        Commands::PostMessage {
            name,
            relationship,
            message,
        } => {
            let ack = client
                .submit_message(&NewMessage {
                    name,
                    relationship,
                    message,
                })
                .await?;
            print_ack(ack, "Message submitted");
            Ok(())
        }
        Commands::Memories {
            kind,
            limit,
            offset,
        } => list_memories(client, kind, limit, offset).await,
        Commands::ShareText { name, message } => {
            let ack = client
                .submit_text_memory(&TextMemory { name, message })
                .await?;
            print_ack(ack, "Memory submitted");
            Ok(())
        }
        Commands::SharePhotos {
            name,
            caption,
            photos,
        } => share_photos(client, name, caption, photos).await,
        Commands::ShareVideo {
            name,
            caption,
            video,
        } => share_video(client, &name, &caption, video).await,
        Commands::SharePast {
            name,
            relationship,
            year,
            memory,
        } => {
            let ack = client
                .submit_past_memory(&PastMemory {
                    name,
                    relationship,
                    memory,
                    year,
                })
                .await?;
            print_ack(ack, "Memory submitted");
            Ok(())
        }
        Commands::Folders => list_folders(client).await,
        Commands::Images { folder } => list_images(client, &folder).await,
        Commands::DriveFolders => list_drive_folders(client).await,
        Commands::DriveImages { folder_id } => list_drive_images(client, &folder_id).await,
        Commands::DriveSync { folder_id } => {
            let response = client.drive_sync(folder_id.as_deref()).await?;
            print_json(&response)
        }
        Commands::CancelReservation(args) => cancel_reservation(client, args).await,
        Commands::Donate(args) => donate(client, args).await,
        Commands::ConfirmDonation { payment_intent_id } => {
            let ack = client.confirm_donation(&payment_intent_id).await?;
            print_ack(ack, "Donation confirmed");
            Ok(())
        }
        Commands::Stats => {
            let stats = client.stats().await?;
            element!(StatsPanel(stats: stats)).print();
            Ok(())
        }
        Commands::Health => {
            let health = client.health().await?;
            println!(
                "{}: {}{}",
                client.base_url(),
                health.status,
                health
                    .timestamp
                    .map(|t| format!(" ({t})"))
                    .unwrap_or_default()
            );
            Ok(())
        }
        Commands::KeepAlive {
            interval,
            failure_threshold,
            ping_timeout,
            webhook_url,
            count,
        } => {
            let mut keep_alive = KeepAlive::new(interval.into(), failure_threshold)
                .with_ping_timeout(ping_timeout.into())
                .with_webhook(webhook_url.or_else(|| config.webhook_url.clone()));
            let stats = keep_alive.run(client, count).await;
            println!(
                "{} ping(s), {} ok, {} failed ({:.1}% success)",
                stats.pings,
                stats.successes,
                stats.failures,
                stats.success_rate()
            );
            Ok(())
        }
        Commands::Get { path, params } => {
            let query: Vec<(&str, Option<String>)> = params
                .iter()
                .map(|(key, value)| (key.as_str(), Some(value.clone())))
                .collect();
            let response = client.get(&path, &query).await?;
            print_json(&response)
        }
        Commands::Config => unreachable!("config is handled before the client is built"),
    }
}

fn print_ack(ack: Acknowledgement, fallback: &str) {
    let mut message = ack.message.unwrap_or_else(|| fallback.to_string());
    if let Some(id) = ack.id {
        message.push_str(&format!(" (id {id})"));
    }
    if ack.success {
        element!(SuccessMessage(message: message)).print();
    } else {
        element!(ErrorMessage(message: message)).print();
    }
}

fn print_json(value: &Value) -> Result<()> {
    let output = highlight(
        &serde_json::to_string_pretty(value)?,
        Options {
            formatter: FormatterOption::Terminal {
                theme: Some(themes::get("ayu_light").expect("Syntax highlighting theme not found")),
            },
            lang_or_file: Some("json"),
        },
    );
    println!("{}", output);
    Ok(())
}

async fn show_page(
    client: &CelebrationClient,
    config: &Config,
    section: Option<String>,
    menu: bool,
) -> Result<()> {
    let mut page = Page::default();
    if let Some(section) = section {
        let anchor = format!("#{}", section.trim_start_matches('#'));
        if !page.tabs.navigate(&anchor) {
            bail!(
                "Unknown section '{}', expected one of: {}",
                section,
                SECTION_TAGS.join(", ")
            );
        }
    }
    // navigating closes the menu, so open it last
    if menu && !page.tabs.menu_open() {
        page.tabs.toggle_menu();
    }

    page.load(
        client,
        LoadOptions {
            settle_delay: config.settle_delay,
            replace_failed_with_notice: true,
        },
    )
    .await;

    element!(PageView(page: page)).print();
    Ok(())
}

async fn list_messages(client: &CelebrationClient, limit: u32, offset: u32) -> Result<()> {
    let response = client.messages(Some(limit), Some(offset)).await?;
    if response.messages.is_empty() {
        println!("{}", page::MESSAGES_PLACEHOLDER);
        return Ok(());
    }

    let shown = response.messages.len();
    element!(MessageList(messages: response.messages)).print();
    if let Some(total) = response.total {
        println!("Showing {} of {} message(s)", shown, total);
    }
    Ok(())
}

async fn list_memories(
    client: &CelebrationClient,
    kind: Option<MemoryType>,
    limit: u32,
    offset: u32,
) -> Result<()> {
    let memories = client.memories(kind, Some(limit), Some(offset)).await?;
    if memories.is_empty() {
        println!("{}", page::MEMORIES_PLACEHOLDER);
    } else {
        element!(MemoryList(memories: memories)).print();
    }
    Ok(())
}

type Rows = Vec<(String, String)>;

fn folder_rows(folders: Vec<GalleryFolder>) -> Rows {
    folders
        .into_iter()
        .map(|folder| {
            let label = folder.display_name.unwrap_or_else(|| folder.name.clone());
            let detail = match folder.description {
                Some(description) if !description.is_empty() => {
                    format!("{} ({} images) {}", folder.name, folder.image_count, description)
                }
                _ => format!("{} ({} images)", folder.name, folder.image_count),
            };
            (label, detail)
        })
        .collect()
}

fn image_rows(images: Vec<GalleryImage>) -> Rows {
    images
        .into_iter()
        .map(|image| (format!("#{}", image.order_index), image.image_url))
        .collect()
}

fn drive_folder_rows(folders: Vec<DriveFolder>) -> Rows {
    folders
        .into_iter()
        .map(|folder| {
            let id = folder.id.unwrap_or_default();
            let detail = match folder.image_count {
                Some(count) => format!("{id} ({count} images)"),
                None => id,
            };
            (folder.name, detail)
        })
        .collect()
}

fn drive_image_rows(images: Vec<DriveImage>) -> Rows {
    images
        .into_iter()
        .map(|image| {
            let label = image.name.or(image.id).unwrap_or_default();
            (label, image.url)
        })
        .collect()
}

async fn list_folders(client: &CelebrationClient) -> Result<()> {
    let rows: Rows = folder_rows(client.gallery_folders().await?);
    element!(RowList(rows: rows)).print();
    Ok(())
}

async fn list_images(client: &CelebrationClient, folder: &str) -> Result<()> {
    let rows: Rows = image_rows(client.gallery_images(folder).await?);
    element!(RowList(rows: rows)).print();
    Ok(())
}

async fn list_drive_folders(client: &CelebrationClient) -> Result<()> {
    let rows: Rows = drive_folder_rows(client.drive_folders().await?);
    element!(RowList(rows: rows)).print();
    Ok(())
}

async fn list_drive_images(client: &CelebrationClient, folder_id: &str) -> Result<()> {
    let rows: Rows = drive_image_rows(client.drive_images(folder_id).await?);
    element!(RowList(rows: rows)).print();
    Ok(())
}

async fn with_progress_bar<T>(
    title: &str,
    progress: watch::Receiver<f32>,
    upload: impl Future<Output = ClientResult<T>>,
) -> Result<T> {
    let mut progress_bar = element!(ProgressBar(title: title.to_string(), progress: Some(progress)));

    let result = tokio::select! {
        result = upload => result,
        _ = progress_bar.render_loop() => {
            bail!("Progress display stopped before the upload finished")
        }
    };

    match result {
        Err(ClientError::Media(e)) => {
            bail!("Nothing was uploaded, {} was rejected: {}", e.file(), e)
        }
        other => Ok(other?),
    }
}

async fn share_photos(
    client: &CelebrationClient,
    name: String,
    caption: String,
    paths: Vec<PathBuf>,
) -> Result<()> {
    let mut photos = Vec::with_capacity(paths.len());
    for path in &paths {
        let photo = MediaFile::open(path).await?;
        if photo.is_empty() {
            bail!("{} is empty", path.display());
        }
        photos.push(photo);
    }
    let original_size: u64 = photos.iter().map(MediaFile::len).sum();

    println!(
        "Compressing and uploading {} photo(s), {} before compression",
        photos.len(),
        format_file_size(original_size)
    );

    let (tx, rx) = watch::channel(0.0);
    let upload = client.submit_photo_memories(&name, &caption, &photos, |percent| {
        let _ = tx.send(percent);
    });

    let ack = with_progress_bar("Uploading photos", rx, upload).await?;
    print_ack(ack, "Photos uploaded");
    Ok(())
}

async fn share_video(client: &CelebrationClient, name: &str, caption: &str, path: PathBuf) -> Result<()> {
    let video = MediaFile::open(&path).await?;

    println!("Uploading {} ({})", path.display(), format_file_size(video.len()));

    let (tx, rx) = watch::channel(0.0);
    let upload = client.submit_video_memory(name, caption, video, |percent| {
        let _ = tx.send(percent);
    });

    let ack = with_progress_bar("Uploading video", rx, upload).await?;
    print_ack(ack, "Video uploaded");
    Ok(())
}

async fn cancel_reservation(client: &CelebrationClient, args: CancellationArgs) -> Result<()> {
    let request = CancellationRequest {
        first_name: args.first_name,
        last_name: args.last_name,
        email: args.email.to_string(),
        phone: args.phone,
        request_type: args.request_type,
        number_of_guests: args.guests,
        reason: args.reason,
        zoom_interest: args.zoom_interest,
        future_updates: args.future_updates,
    };

    let ack = client.cancel_reservation(&request).await?;
    print_ack(ack, "Cancellation request received");
    Ok(())
}

async fn donate(client: &CelebrationClient, args: DonateArgs) -> Result<()> {
    if !(args.amount > 0.0) {
        bail!("Donation amount must be greater than zero");
    }

    let request = DonationIntentRequest {
        amount: args.amount,
        donor_name: args.name,
        donor_email: args.email.to_string(),
        charity_id: args.charity_id,
        charity_name: args.charity_name,
        message: args.message,
    };

    let response = client.create_donation_intent(&request).await?;
    element!(SuccessMessage(message: "Donation started".to_string())).print();
    println!("Complete your donation at: {}", response.checkout_url);
    Ok(())
}

fn parse_query_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

fn folder_completer(current: &std::ffi::OsStr) -> Vec<CompletionCandidate> {
    let mut completions = vec![];
    let Some(current) = current.to_str() else {
        return completions;
    };

    let Ok(config) = config::read_config() else {
        return completions;
    };

    let client = CelebrationClient::new(config.base_url);

    let handle = Handle::current();
    let Ok(folders) = handle.block_on(client.gallery_folders()) else {
        return completions;
    };

    folders.into_iter().for_each(|folder| {
        if folder.name.starts_with(current) {
            completions.push(CompletionCandidate::new(folder.name));
        }
    });

    completions
}

fn read_input(prompt: &str, default: Option<&str>, description: Option<&str>) -> Result<String> {
    element! {
        InputPrompt(
            prompt: prompt.to_string(),
            default: default.map(|s| s.to_string()),
            description: description.map(|s| s.to_string())
        )
    }
    .print();

    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    if input.is_empty() {
        Ok(default.map(str::to_string).unwrap_or(input))
    } else {
        Ok(input)
    }
}

fn read_seconds(prompt: &str, current: u64, description: &str) -> Result<u64> {
    loop {
        let value = read_input(prompt, Some(&current.to_string()), Some(description))?;
        match value.parse::<u64>() {
            Ok(secs) if secs > 0 => break Ok(secs),
            _ => {
                element!(ErrorMessage(message: format!("Invalid number of seconds: {}", value))).print();
                println!();
            }
        }
    }
}

fn interactive_config() -> Result<()> {
    element!(ConfigHeader()).print();

    let existing = config::read_config_file().context("Unable to read existing configuration")?;

    let current_url = existing
        .base_url
        .as_ref()
        .map(Url::to_string)
        .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string());

    let base_url = loop {
        let base_url_str = read_input(
            "Backend base URL",
            Some(&current_url),
            Some("The API root of the celebration backend, e.g. https://example.com/api/"),
        )?;

        match Url::parse(&base_url_str) {
            Ok(url) => break url,
            Err(e) => {
                element!(ErrorMessage(message: format!("Invalid URL: {}", e))).print();
                println!();
            }
        }
    };

    let request_timeout_secs = read_seconds(
        "Request timeout (seconds)",
        existing
            .request_timeout_secs
            .unwrap_or(client::DEFAULT_REQUEST_TIMEOUT.as_secs()),
        "How long to wait for a regular API call",
    )?;

    let upload_timeout_secs = read_seconds(
        "Upload timeout (seconds)",
        existing
            .upload_timeout_secs
            .unwrap_or(client::DEFAULT_UPLOAD_TIMEOUT.as_secs()),
        "How long to wait for a photo or video upload",
    )?;

    let config_file = config::ConfigFile {
        base_url: Some(base_url),
        request_timeout_secs: Some(request_timeout_secs),
        upload_timeout_secs: Some(upload_timeout_secs),
        settle_delay_ms: existing.settle_delay_ms,
        webhook_url: existing.webhook_url,
    };

    let path = config::write_config(config_file)?;

    element!(SuccessMessage(message: format!("Configuration saved to {}", path.display()))).print();

    Ok(())
}
