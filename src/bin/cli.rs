use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use log::{LevelFilter, info};
use std::path::{Path, PathBuf};
use stegstr_engine::{EmbedOptions, Identity, Method, Platform, envelope, image_handler};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hide a payload in a cover image and write a PNG
    Embed {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, conflicts_with = "message_file")]
        message: Option<String>,
        #[arg(long)]
        message_file: Option<PathBuf>,
        #[arg(long, env = "STEGSTR_METHOD", default_value = "qim")]
        method: Method,
        #[arg(long, env = "STEGSTR_PLATFORM", default_value = "generic")]
        platform: Platform,
        /// Recipient public key in hex; repeat for several recipients
        #[arg(short, long)]
        recipient: Vec<String>,
        /// Sender secret key in hex, required with --recipient
        #[arg(long)]
        identity: Option<String>,
    },
    /// Recover the payload of a stego image
    Detect {
        #[arg(short, long)]
        input: PathBuf,
        /// Secret key in hex to open recipient-only payloads; repeatable
        #[arg(long)]
        identity: Vec<String>,
        /// Write the payload here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print how many payload bytes a cover holds
    Capacity {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, env = "STEGSTR_METHOD", default_value = "qim")]
        method: Method,
        #[arg(long, env = "STEGSTR_PLATFORM", default_value = "generic")]
        platform: Platform,
    },
    /// Apply a platform's resize and JPEG re-encode; the result is saved as PNG
    Simulate {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, env = "STEGSTR_PLATFORM", default_value = "generic")]
        platform: Platform,
    },
    /// Generate an X25519 identity
    Keygen,
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn read_payload(message: Option<String>, message_file: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    match (message, message_file) {
        (Some(text), _) => Ok(text.into_bytes()),
        (None, Some(path)) => {
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
        }
        (None, None) => bail!("either --message or --message-file is required"),
    }
}

fn load_rgba(path: &Path) -> anyhow::Result<image::RgbaImage> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    image_handler::load_rgba_from_bytes(&bytes)
}

fn write_png(path: &Path, image: image::RgbaImage) -> anyhow::Result<()> {
    let output_bytes = image_handler::save_image_to_bytes(&DynamicImage::ImageRgba8(image))?;
    std::fs::write(path, output_bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Embed {
            input,
            output,
            message,
            message_file,
            method,
            platform,
            recipient,
            identity,
        } => {
            let cover = load_rgba(&input)?;
            let payload = read_payload(message, message_file)?;
            let options = EmbedOptions {
                method,
                platform: Some(platform),
            };

            let embedded = if recipient.is_empty() {
                stegstr_engine::embed(&cover, &payload, &options)?
            } else {
                let Some(secret) = identity else {
                    bail!("--identity is required when sending to recipients");
                };
                let sender = Identity::from_secret_hex(&secret)?;
                let recipients = recipient
                    .iter()
                    .map(|key| envelope::parse_public_key_hex(key))
                    .collect::<Result<Vec<_>, _>>()?;
                stegstr_engine::embed_for_recipients(&cover, &payload, &sender, &recipients, &options)?
            };

            let verified = embedded.verified;
            write_png(&output, embedded.image)?;
            info!(
                "embedded {} bytes with {method} into {} (verified: {verified})",
                payload.len(),
                output.display()
            );
        }

        Commands::Detect {
            input,
            identity,
            output,
        } => {
            let image = load_rgba(&input)?;
            let identities = identity
                .iter()
                .map(|secret| Identity::from_secret_hex(secret))
                .collect::<Result<Vec<_>, _>>()?;
            let payload = stegstr_engine::detect_as(&image, &identities)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &payload)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!("wrote {} bytes to {}", payload.len(), path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&payload)),
            }
        }

        Commands::Capacity {
            input,
            method,
            platform,
        } => {
            let cover = load_rgba(&input)?;
            let options = EmbedOptions {
                method,
                platform: Some(platform),
            };
            println!("{}", stegstr_engine::capacity(&cover, &options));
        }

        Commands::Simulate {
            input,
            output,
            platform,
        } => {
            let image = load_rgba(&input)?;
            let simulated = image_handler::simulate_channel(&image, platform)?;
            let (width, height) = simulated.dimensions();
            write_png(&output, simulated)?;
            info!(
                "simulated {platform}: {width}x{height} at quality {}",
                platform.recompress_quality()
            );
        }

        Commands::Keygen => {
            let identity = Identity::generate();
            println!("secret: {}", identity.secret_hex());
            println!("public: {}", identity.public_hex());
        }
    }

    Ok(())
}
