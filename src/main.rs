use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use seoman_rs::auth::{Credentials, DEFAULT_CREDENTIALS_FILE, TokenRefresher};
use seoman_rs::export::{self, ExportFormat};
use seoman_rs::progress::{BarProgress, ProgressSink};
use seoman_rs::prompt::{ConfirmGate, FixedAnswer, TerminalConfirm};
use seoman_rs::saved_query::{QueryStore, SavedQuery};
use seoman_rs::traffic::site_traffic;
use seoman_rs::{
    CredentialRetry, DateRange, Error, FetchConfig, FetchScheduler, Granularity, PassKind, SearchConsole,
    build_bodies, dates, fetch_report, partition,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_DAYS: u32 = 30;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
    /// OAuth credentials file
    #[clap(long, global = true, env = "SEOMAN_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Directory holding saved queries [default: ~/.queries]
    #[clap(long, global = true, env = "SEOMAN_QUERIES_DIR")]
    queries_dir: Option<PathBuf>,

    /// Where exported reports are written
    #[clap(short, long, global = true, env = "SEOMAN_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run an ad-hoc search analytics query
    Manual {
        #[clap(flatten)]
        query: QueryOptions,

        #[clap(flatten)]
        fetch: FetchOptions,

        #[clap(short, long, default_value = "csv")]
        export: ExportFormat,
    },

    /// Create, inspect and run saved queries
    Query {
        #[clap(subcommand)]
        command: QueryCommand,
    },

    /// List the properties associated with the account
    Sites {
        /// Show a single property
        #[clap(long)]
        url: Option<String>,

        /// Write the listing to a file instead of stdout
        #[clap(short, long)]
        export: Option<ExportFormat>,
    },

    /// List the sitemaps submitted for a site, or show one of them
    Sitemaps {
        /// The site's URL, e.g. https://www.example.com/
        #[clap(long)]
        url: String,

        /// The sitemap's own URL, e.g. https://www.example.com/sitemap.xml
        #[clap(long)]
        feedpath: Option<String>,

        /// Write the listing to a file instead of stdout
        #[clap(short, long)]
        export: Option<ExportFormat>,
    },

    /// Total clicks and impressions per site over the last days
    Traffic {
        /// Number of days to look back
        #[clap(default_value_t = DEFAULT_DAYS)]
        days: u32,

        /// Only this site instead of every verified one
        #[clap(long)]
        site: Option<String>,

        /// Write the listing to a file instead of stdout
        #[clap(short, long)]
        export: Option<ExportFormat>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum QueryCommand {
    /// Run a saved query
    Run {
        name: String,

        /// Override the url stored in the query
        #[clap(long)]
        url: Option<String>,

        /// Override the granularity stored in the query
        #[clap(short, long)]
        granularity: Option<Granularity>,

        #[clap(flatten)]
        fetch: FetchOptions,
    },

    /// Save a query for later runs
    Save {
        name: String,

        #[clap(flatten)]
        query: QueryOptions,

        #[clap(short, long, default_value = "csv")]
        export: ExportFormat,
    },

    /// Print a saved query
    Show { name: String },

    /// List saved queries
    List,

    /// Delete a saved query
    Delete { name: String },
}

#[derive(clap::Args, Debug)]
struct QueryOptions {
    /// The site's URL, e.g. sc-domain:example.com or https://example.com/
    #[clap(long)]
    url: String,

    /// Start date, e.g. 2020-03-01, 2020-03 or "2 months ago"
    #[clap(long)]
    start_date: Option<String>,

    /// End date [default: today]
    #[clap(long)]
    end_date: Option<String>,

    /// Query the last N days when no start date is given
    #[clap(long, conflicts_with = "start_date")]
    days: Option<u32>,

    /// Dimensions to group by (date, page, query, country, device or all)
    #[clap(short, long, value_delimiter = ',')]
    dimensions: Vec<String>,

    /// Filter as "<dimension> <operator> <expression>", repeatable
    #[clap(short, long)]
    filter: Vec<String>,

    /// web, image or video
    #[clap(long)]
    search_type: Option<String>,

    #[clap(long)]
    row_limit: Option<u32>,

    #[clap(long)]
    start_row: Option<u32>,

    /// daily, weekly, monday, weekends, weekdays, 10, ...
    #[clap(short, long)]
    granularity: Option<Granularity>,
}

impl QueryOptions {
    fn to_saved(&self, export: ExportFormat) -> SavedQuery {
        let start_date = self.start_date.clone().unwrap_or_else(|| {
            format!("{} days ago", self.days.unwrap_or(DEFAULT_DAYS))
        });

        SavedQuery {
            url: Some(self.url.clone()),
            start_date: Some(start_date),
            end_date: self.end_date.clone(),
            dimensions: self.dimensions.clone(),
            filters: self.filter.clone(),
            search_type: self.search_type.clone(),
            row_limit: self.row_limit,
            start_row: self.start_row,
            export_type: Some(export.to_string()),
            granularity: self.granularity.map(|g| g.to_string()),
        }
    }
}

#[derive(clap::Args, Debug)]
struct FetchOptions {
    /// Queries in flight at once
    #[clap(short = 'p', long, env = "SEOMAN_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Fetch rows past the first page without asking
    #[clap(long, conflicts_with = "no_overflow")]
    yes_overflow: bool,

    /// Never fetch rows past the first page
    #[clap(long)]
    no_overflow: bool,
}

impl FetchOptions {
    fn overflow_gate(&self) -> Box<dyn ConfirmGate> {
        if self.yes_overflow {
            Box::new(FixedAnswer(true))
        } else if self.no_overflow {
            Box::new(FixedAnswer(false))
        } else {
            Box::new(TerminalConfirm::new(false))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "seoman_rs=debug,seoman=debug"
    } else {
        "seoman_rs=info,seoman=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Authenticated client plus the means to refresh it.
struct Session {
    client: Arc<SearchConsole>,
    refresher: TokenRefresher,
}

impl Session {
    fn open(credentials_path: &Path) -> Result<Self> {
        let credentials = Credentials::load(credentials_path)
            .context("run the consent flow first and store its output as credentials.json")?;
        let client = Arc::new(SearchConsole::new(credentials.token)?);
        let refresher = TokenRefresher::new(credentials_path, client.clone());
        Ok(Self { client, refresher })
    }
}

fn query_store(args: &Args) -> Result<QueryStore> {
    match args.queries_dir.clone().or_else(QueryStore::default_dir) {
        Some(dir) => Ok(QueryStore::new(dir)),
        None => bail!("could not find the home directory, pass --queries-dir"),
    }
}

async fn run_query(
    args: &Args,
    command: &str,
    saved: &SavedQuery,
    granularity: Option<Granularity>,
    fetch: &FetchOptions,
) -> Result<()> {
    let site_url = saved
        .url
        .as_deref()
        .context("the query has no url, pass --url")?;
    let format: ExportFormat = saved.export_type.as_deref().unwrap_or("csv").parse()?;

    let base = saved.to_body(dates::today())?;
    let range = DateRange::new(base.start_date, base.end_date)?;
    let bodies = build_bodies(&base, &partition(range, granularity)?);
    tracing::info!(site = site_url, queries = bodies.len(), "prepared queries");

    let session = Session::open(&args.credentials)?;
    let config = FetchConfig {
        concurrency: fetch.concurrency,
        ..FetchConfig::default()
    };
    let scheduler = FetchScheduler::new(session.client.clone(), config).with_pass_progress(
        |kind| -> Arc<dyn ProgressSink> {
            Arc::new(BarProgress::new(match kind {
                PassKind::First => "Fetching data",
                PassKind::Overflow => "Fetching more data",
            }))
        },
    );
    let reauth_gate = TerminalConfirm::new(true);
    let retry = CredentialRetry::new(&reauth_gate, &session.refresher);
    let overflow_gate = fetch.overflow_gate();

    let report = match fetch_report(&scheduler, &retry, overflow_gate.as_ref(), site_url, &bodies).await {
        Err(Error::EmptyResult) => {
            eprintln!("{}", Error::EmptyResult);
            return Ok(());
        }
        other => other?,
    };

    if !report.failures.is_empty() {
        eprintln!(
            "warning: {} of {} queries failed and contributed no rows",
            report.failures.len(),
            bodies.len()
        );
    }
    if report.skipped_overflow > 0 {
        eprintln!(
            "warning: rows past the first page were skipped for {} queries",
            report.skipped_overflow
        );
    }

    let path = export::output_path(
        &args.output_dir,
        Some(site_url),
        command,
        format,
        chrono::Local::now(),
    );
    export::write_report(&path, format, &base.dimensions, &report.result)?;
    println!(
        "Analytics successfully created in {} format: {}",
        format.extension().to_uppercase(),
        path.display()
    );

    Ok(())
}

async fn show_sites(args: &Args, url: Option<&str>, export_format: Option<ExportFormat>) -> Result<()> {
    let session = Session::open(&args.credentials)?;
    let reauth_gate = TerminalConfirm::new(true);
    let retry = CredentialRetry::new(&reauth_gate, &session.refresher);
    let client = session.client.as_ref();

    let sites = retry
        .run(move || async move {
            let sites = match url {
                Some(url) => vec![client.site(url).await?],
                None => client.sites().await?,
            };
            Ok::<_, Error>(sites)
        })
        .await?;

    match export_format {
        Some(format) => {
            let path =
                export::output_path(&args.output_dir, url, "sites", format, chrono::Local::now());
            export::write_listing(&path, format, &sites)?;
            println!("Sites written to {}", path.display());
        }
        None => {
            for site in &sites {
                println!("{}\t{}", site.site_url, site.permission_level);
            }
        }
    }

    Ok(())
}

async fn show_sitemaps(
    args: &Args,
    url: &str,
    feedpath: Option<&str>,
    export_format: Option<ExportFormat>,
) -> Result<()> {
    let session = Session::open(&args.credentials)?;
    let reauth_gate = TerminalConfirm::new(true);
    let retry = CredentialRetry::new(&reauth_gate, &session.refresher);
    let client = session.client.as_ref();

    let sitemaps = retry
        .run(move || async move {
            let sitemaps = match feedpath {
                Some(feedpath) => vec![client.sitemap(url, feedpath).await?],
                None => client.sitemaps(url).await?,
            };
            Ok::<_, Error>(sitemaps)
        })
        .await?;

    match export_format {
        Some(format) => {
            let path =
                export::output_path(&args.output_dir, Some(url), "sitemaps", format, chrono::Local::now());
            export::write_listing(&path, format, &sitemaps)?;
            println!("Sitemaps written to {}", path.display());
        }
        None if sitemaps.is_empty() => println!("No sitemaps submitted for {}", url),
        None => {
            for sitemap in &sitemaps {
                println!(
                    "{}\tsubmitted {}\twarnings {}\terrors {}",
                    sitemap.path,
                    sitemap.last_submitted.as_deref().unwrap_or("-"),
                    sitemap.warnings.as_deref().unwrap_or("0"),
                    sitemap.errors.as_deref().unwrap_or("0"),
                );
            }
        }
    }

    Ok(())
}

async fn show_traffic(
    args: &Args,
    days: u32,
    site: Option<&str>,
    export_format: Option<ExportFormat>,
) -> Result<()> {
    let range = dates::last_days(days, dates::today())?;
    let session = Session::open(&args.credentials)?;
    let reauth_gate = TerminalConfirm::new(true);
    let retry = CredentialRetry::new(&reauth_gate, &session.refresher);
    let client = session.client.as_ref();

    let traffic = retry
        .run(move || async move {
            let sites = match site {
                Some(site) => vec![site.to_string()],
                None => client
                    .sites()
                    .await?
                    .into_iter()
                    .map(|s| s.site_url)
                    .collect(),
            };
            let progress = BarProgress::new("Fetching data");
            site_traffic(client, &sites, range, &progress).await
        })
        .await?;

    let label = format!("{}-{}", range.start(), range.end());
    match export_format {
        Some(format) => {
            let path =
                export::output_path(&args.output_dir, Some(label.as_str()), "traffic", format, chrono::Local::now());
            export::write_listing(&path, format, &traffic)?;
            println!("Traffic written to {}", path.display());
        }
        None => {
            println!("Traffic from {} to {}", range.start(), range.end());
            for entry in &traffic {
                println!(
                    "{}\tclicks {}\timpressions {}\tctr {:.4}\tposition {:.1}",
                    entry.site_url, entry.clicks, entry.impressions, entry.ctr, entry.position
                );
            }
        }
    }

    Ok(())
}

async fn query_command(args: &Args, command: &QueryCommand) -> Result<()> {
    let store = query_store(args)?;

    match command {
        QueryCommand::Run {
            name,
            url,
            granularity,
            fetch,
        } => {
            let mut saved = store.load(name)?;
            if url.is_some() {
                saved.url = url.clone();
            }
            let granularity = match granularity {
                Some(g) => Some(*g),
                None => saved.granularity()?,
            };
            run_query(args, name, &saved, granularity, fetch).await
        }
        QueryCommand::Save {
            name,
            query,
            export,
        } => {
            let path = store.save(name, &query.to_saved(*export))?;
            println!("Query saved to {}", path.display());
            Ok(())
        }
        QueryCommand::Show { name } => {
            let saved = store.load(name)?;
            print!("{}", toml::to_string(&saved)?);
            Ok(())
        }
        QueryCommand::List => {
            for name in store.list()? {
                println!("{}", name);
            }
            Ok(())
        }
        QueryCommand::Delete { name } => {
            store.delete(name)?;
            println!("Deleted {}", name);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Manual {
            query,
            fetch,
            export,
        } => {
            let saved = query.to_saved(*export);
            run_query(&args, "manual", &saved, query.granularity, fetch).await
        }
        Command::Query { command } => query_command(&args, command).await,
        Command::Sites { url, export } => show_sites(&args, url.as_deref(), *export).await,
        Command::Sitemaps {
            url,
            feedpath,
            export,
        } => show_sitemaps(&args, url, feedpath.as_deref(), *export).await,
        Command::Traffic { days, site, export } => {
            show_traffic(&args, *days, site.as_deref(), *export).await
        }
    }
}
