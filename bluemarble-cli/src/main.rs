use bluemarble::image::io::load_rgba;
use bluemarble::{
    coords::parse_display_coordinates, Anchor, EngineConfig, FileStore, Persisted, TemplateKey,
    TemplateRegistry, TileAddress,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "BlueMarble template tool (document file driven)")]
struct Cli {
    /// Path to the template document.
    #[arg(short, long, value_name = "FILE", default_value = "templates.json")]
    doc: PathBuf,
    /// Optional JSON engine configuration.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Numeric user id used to namespace new templates.
    #[arg(long)]
    user_id: Option<u64>,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk an image and add it as a template.
    Add {
        #[arg(long)]
        image: PathBuf,
        /// Display name; defaults to the file stem.
        #[arg(long)]
        name: Option<String>,
        /// Anchor as "tileX, tileY, pixelX, pixelY".
        #[arg(long)]
        coords: String,
    },
    /// List templates in the document.
    List,
    /// Show a template when compositing.
    Enable {
        #[arg(long)]
        key: String,
    },
    /// Hide a template when compositing.
    Disable {
        #[arg(long)]
        key: String,
    },
    /// Delete a template.
    Remove {
        #[arg(long)]
        key: String,
    },
    /// Composite templates over a tile image.
    Composite {
        #[arg(long)]
        tile: PathBuf,
        /// Tile address as "tileX, tileY".
        #[arg(long)]
        address: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Convert a tile/pixel pair to the site's display readout.
    Display {
        /// Tile as "tileX, tileY".
        #[arg(long)]
        tile: String,
        /// Pixel as "pixelX, pixelY".
        #[arg(long)]
        pixel: String,
    },
}

#[derive(Debug, Serialize)]
struct TemplateRow {
    key: String,
    name: String,
    coords: String,
    enabled: bool,
    pixel_count: u64,
    fragments: usize,
}

#[derive(Debug, Serialize)]
struct CompositeOutput {
    out: String,
    pixel_count: u64,
    fragments_drawn: usize,
}

fn split_pair(text: &str) -> Result<[&str; 2], Box<dyn std::error::Error>> {
    let parts: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    match parts.as_slice() {
        [a, b] => Ok([*a, *b]),
        _ => Err(format!("expected two components, got {text:?}").into()),
    }
}

fn display_coordinates(
    tile: &str,
    pixel: &str,
    config: &EngineConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    config.validate()?;
    let [x, y] =
        parse_display_coordinates(split_pair(tile)?, split_pair(pixel)?, config.tile_size)?;
    Ok(format!("{x}, {y}"))
}

fn report_storage<T>(persisted: Persisted<T>) -> T {
    if let Some(err) = &persisted.storage_error {
        tracing::warn!("document not saved: {err}");
        eprintln!("warning: {err}");
    }
    persisted.value
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("bluemarble=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
        return Ok(());
    }

    let config: EngineConfig = match &cli.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    let Some(command) = cli.command else {
        return Err("no command given (try --help)".into());
    };

    // Pure coordinate math; the document is never read.
    if let Command::Display { tile, pixel } = &command {
        println!("{}", display_coordinates(tile, pixel, &config)?);
        return Ok(());
    }

    let mut registry = TemplateRegistry::new(config)?.with_store(FileStore::new(&cli.doc));
    let loaded = registry.load_from_store()?;
    tracing::info!(templates = loaded, "loaded {}", cli.doc.display());
    if let Some(user_id) = cli.user_id {
        registry.set_user_id(user_id);
    }

    match command {
        Command::Add {
            image,
            name,
            coords,
        } => {
            let anchor = Anchor::parse(&coords, registry.config().tile_size)?;
            let name = name.unwrap_or_else(|| {
                image
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "My template".to_string())
            });
            let source = load_rgba(&image)?;
            let created =
                report_storage(registry.create_template_from_image(&source, &name, anchor)?);
            println!(
                "added template {:?}: {} pixels in {} fragments",
                created.key.to_string(),
                created.pixel_count,
                created.fragments
            );
        }
        Command::List => {
            let rows: Vec<TemplateRow> = registry
                .templates()
                .map(|t| TemplateRow {
                    key: t.key().to_string(),
                    name: t.display_name().to_string(),
                    coords: t.anchor().to_string(),
                    enabled: t.is_enabled(),
                    pixel_count: t.pixel_count(),
                    fragments: t.fragments().len(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Enable { key } => {
            let key: TemplateKey = key.parse()?;
            report_storage(registry.set_enabled(&key, true)?);
        }
        Command::Disable { key } => {
            let key: TemplateKey = key.parse()?;
            report_storage(registry.set_enabled(&key, false)?);
        }
        Command::Remove { key } => {
            let key: TemplateKey = key.parse()?;
            report_storage(registry.delete_template(&key)?);
        }
        Command::Composite { tile, address, out } => {
            let address: TileAddress = address.parse()?;
            let tile_img = load_rgba(&tile)?;
            let composited = registry.composite_bitmap(&tile_img, address)?;
            fs::write(&out, &composited.png)?;
            let output = CompositeOutput {
                out: out.display().to_string(),
                pixel_count: composited.pixel_count,
                fragments_drawn: composited.fragments_drawn,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        // Answered before the document is opened.
        Command::Display { .. } => {}
    }

    Ok(())
}
