use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use raptors_etl::config::Config;
use raptors_etl::controllers::{
    self, Backup, BackupOptions, BookingReport, CleanBookingOptions, CleanSfdcOptions,
    GenerateOptions, SyncOptions,
};
use raptors_etl::io::store::MongoStore;
use raptors_etl::{EtlError, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;
    let config = Config::load(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Backup(args) => execute_backup(args, &config),
        Command::Sync(args) => execute_sync(&cli.mongo, args, &config),
        Command::CleanBooking(args) => execute_clean_booking(&cli.mongo, args, &config),
        Command::CleanSfdc(args) => execute_clean_sfdc(&cli.mongo, args, &config),
        Command::Generate(args) => execute_generate(&cli.mongo, args, &config),
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .try_init()
        .map_err(|error| EtlError::Logging(error.to_string()))
}

fn connect(mongo: &MongoArgs, config: &Config, database: Option<&str>) -> Result<MongoStore> {
    let uri = config.mongo.uri(mongo.host.as_deref(), mongo.port);
    MongoStore::connect(&uri, &config.database_or_default(database))
}

fn execute_backup(args: BackupArgs, config: &Config) -> Result<()> {
    let backup = Backup::new(
        BackupOptions {
            all: args.alldata,
            out: args.outfile,
            database: args.database,
            collection: args.collection,
        },
        config,
    );
    let archive = backup.execute()?;
    info!("backup written to {}", archive.display());
    Ok(())
}

fn execute_sync(mongo: &MongoArgs, args: SyncArgs, config: &Config) -> Result<()> {
    let store = connect(mongo, config, args.database.as_deref())?;
    let report = controllers::sync(
        &store,
        config,
        &SyncOptions {
            input: args.input,
            sheet: args.sheet,
            collection: args.collection,
        },
    )?;
    info!(
        rows = report.rows_read,
        removed = report.purge.removed,
        inserted = report.write.inserted,
        "sync finished"
    );
    Ok(())
}

fn execute_clean_booking(mongo: &MongoArgs, args: CleanBookingArgs, config: &Config) -> Result<()> {
    let store = connect(mongo, config, args.database.as_deref())?;
    let report = controllers::clean_booking_dump(
        &store,
        config,
        &CleanBookingOptions {
            years: args.years,
            history: args.history,
            comm: args.comm,
            destination: args.table,
        },
    )?;
    info!(
        rows = report.rows_read,
        unmapped = report.unmapped.total(),
        inserted = report.write.inserted,
        "booking dump cleaned"
    );
    Ok(())
}

fn execute_clean_sfdc(mongo: &MongoArgs, args: CleanSfdcArgs, config: &Config) -> Result<()> {
    let store = connect(mongo, config, args.database.as_deref())?;
    let report = controllers::clean_sfdc_dump(
        &store,
        config,
        &CleanSfdcOptions {
            comm: args.comm,
            destination: args.table,
        },
    )?;
    info!(
        rows = report.rows_read,
        unmapped = report.unmapped.total(),
        inserted = report.write.inserted,
        "sfdc dump cleaned"
    );
    Ok(())
}

fn execute_generate(mongo: &MongoArgs, args: GenerateArgs, config: &Config) -> Result<()> {
    let options = GenerateOptions {
        name: args.name,
        owner: args.owner,
        history: args.history,
        current_year: args.current_year,
        field_config: args.fields,
        filepath: args.filepath,
        sheet: args.sheet,
        csv: args.csv,
    };
    let report = BookingReport::plan(config, &options)?;
    if args.print_pipeline {
        println!("{}", serde_json::to_string_pretty(&report.pipelines)?);
    }

    let store = connect(mongo, config, args.database.as_deref())?;
    let path =
        controllers::write_report(&store, &report, options.sheet.as_deref(), options.csv)?;
    info!("report written to {}", path.display());
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "raptors",
    author,
    version,
    about = "Load, clean and report on sales dumps kept in MongoDB."
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    mongo: MongoArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct MongoArgs {
    /// MongoDB host, overriding the configuration.
    #[arg(long, global = true)]
    host: Option<String>,

    /// MongoDB port, overriding the configuration.
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Command {
    /// Dump MongoDB into a timestamped archive.
    Backup(BackupArgs),
    /// Upload a spreadsheet into a collection.
    Sync(SyncArgs),
    /// Rebuild `booking_dump` from `ent_dump_from_finance`.
    CleanBooking(CleanBookingArgs),
    /// Rebuild `sfdc_dump` from `sfdc_raw_dump`.
    CleanSfdc(CleanSfdcArgs),
    /// Generate an Excel report.
    Generate(GenerateArgs),
}

#[derive(Args)]
struct BackupArgs {
    /// Also archive the spreadsheets of the home directory.
    #[arg(long)]
    alldata: bool,

    /// Directory in which the dump is created.
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    #[arg(short, long)]
    database: Option<String>,

    #[arg(short, long)]
    collection: Option<String>,
}

#[derive(Args)]
struct SyncArgs {
    /// Spreadsheet to upload.
    #[arg(short, long)]
    input: PathBuf,

    /// Worksheet to read; the first one when absent.
    #[arg(short, long)]
    sheet: Option<String>,

    /// Destination collection.
    #[arg(short, long)]
    collection: String,

    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Args)]
struct CleanBookingArgs {
    /// Fiscal years to include, e.g. `--years 2018,2017`.
    #[arg(long, value_delimiter = ',')]
    years: Vec<i32>,

    /// Years back from the current fiscal year (2 when unset).
    #[arg(long, default_value_t = 0)]
    history: u32,

    /// Keep the commercial sales level only.
    #[arg(long)]
    comm: bool,

    /// Destination collection.
    #[arg(short, long)]
    table: Option<String>,

    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Args)]
struct CleanSfdcArgs {
    #[arg(long)]
    comm: bool,

    #[arg(short, long)]
    table: Option<String>,

    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Args)]
struct GenerateArgs {
    /// Report name.
    #[arg(short, long, default_value = "booking")]
    name: String,

    /// Report owner; selects the sales-level filter.
    #[arg(short, long, default_value = "comm")]
    owner: String,

    #[arg(long, default_value_t = 1)]
    history: u32,

    #[arg(long)]
    current_year: Option<i32>,

    /// Field switches: `a:field` adds a group field, `r:field` removes one.
    #[arg(short = 'f', long = "field")]
    fields: Vec<String>,

    /// Output directory; the configured home directory when absent.
    #[arg(long)]
    filepath: Option<PathBuf>,

    #[arg(short, long)]
    sheet: Option<String>,

    /// Write CSV instead of Excel.
    #[arg(long)]
    csv: bool,

    /// Print the aggregation pipelines as JSON before running them.
    #[arg(long)]
    print_pipeline: bool,

    #[arg(short, long)]
    database: Option<String>,
}
