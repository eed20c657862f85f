use altstore_source::{
    encode_catalog, Catalog, DecodeOptions, EmptyVersionsPolicy, HttpTransport, SourceFetcher,
    SourceLocation, TransportConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fetch and inspect an AltStore app source
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the source JSON
    #[arg(
        long,
        env = "SOURCE_URL",
        conflicts_with = "file",
        required_unless_present = "file"
    )]
    source_url: Option<String>,

    /// Local source JSON file to import instead of fetching
    #[arg(long, env = "SOURCE_FILE")]
    file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Reject apps that list no versions
    #[arg(long, env = "STRICT_VERSIONS")]
    strict_versions: bool,

    /// Print the decoded catalog as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "altstore_source=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let transport_config = TransportConfig {
        timeout: Duration::from_secs(args.timeout_secs),
        ..TransportConfig::default()
    };
    let options = DecodeOptions {
        empty_versions: if args.strict_versions {
            EmptyVersionsPolicy::Reject
        } else {
            EmptyVersionsPolicy::Allow
        },
    };

    let transport =
        HttpTransport::new(&transport_config).context("Failed to build HTTP client")?;
    let fetcher = SourceFetcher::with_options(transport, options);

    let location = match (&args.source_url, &args.file) {
        (_, Some(path)) => {
            tracing::info!("Importing source from {}", path.display());
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            SourceLocation::Local(bytes)
        }
        (Some(url), None) => {
            tracing::info!("Fetching source from {}", url);
            SourceLocation::Remote(url.clone())
        }
        (None, None) => anyhow::bail!("either --source-url or --file is required"),
    };

    let catalog = fetcher
        .fetch_source(location)
        .await
        .context("Failed to load source")?;

    if args.json {
        let encoded = encode_catalog(&catalog).context("Failed to encode catalog")?;
        println!("{}", String::from_utf8_lossy(&encoded));
    } else {
        print_summary(&catalog);
    }

    Ok(())
}

fn print_summary(catalog: &Catalog) {
    println!("{}", catalog.name);
    if let Some(subtitle) = &catalog.subtitle {
        println!("  {}", subtitle);
    }
    println!("  {} apps, {} news items", catalog.apps.len(), catalog.news().len());

    for app in &catalog.apps {
        match app.latest_version() {
            Some(version) => {
                let released = version
                    .release_date()
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| version.date.clone());
                println!(
                    "  - {} ({}) {} by {}, released {}, {} bytes",
                    app.name,
                    app.bundle_identifier,
                    version.version,
                    app.developer_name,
                    released,
                    version.size
                );
            }
            None => {
                println!(
                    "  - {} ({}) by {}, no installable version",
                    app.name, app.bundle_identifier, app.developer_name
                );
            }
        }
    }

    let featured = catalog.featured_apps();
    if !featured.is_empty() {
        let names: Vec<&str> = featured.iter().map(|app| app.name.as_str()).collect();
        println!("  Featured: {}", names.join(", "));
    }
}
