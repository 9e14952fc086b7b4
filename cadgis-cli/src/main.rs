//! `cadgis` command line driver.
//!
//! Every command loads the settings from the settings directory, does its work and, if it
//! changed the drawing, saves the drawing file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cadgis")]
#[command(about = "Import ArcGIS and PostGIS features into drawings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings directory (overrides CADGIS_HOME)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Save feature service credentials and check them
    Login(LoginArgs),
    /// Save database settings and check them
    #[command(name = "pg-login")]
    PgLogin(PgLoginArgs),
    /// List folders of the feature service account
    Folders,
    /// List feature services in a folder
    Services {
        /// Folder id, root folder if not set
        #[arg(long, default_value = "")]
        folder: String,
    },
    /// Import all layers of a feature service
    #[command(name = "import-service")]
    ImportService {
        /// Item id of the service
        #[arg(long)]
        item: String,
        /// Prefix of the layer names
        #[arg(long)]
        layer_prefix: Option<String>,
        #[command(flatten)]
        drawing: DrawingArgs,
        #[command(flatten)]
        symbol: SymbolArgs,
    },
    /// List tables with a geometry column
    #[command(name = "pg-tables")]
    PgTables,
    /// List columns of a table
    #[command(name = "pg-columns")]
    PgColumns {
        /// Table as schema.table
        #[arg(long)]
        table: String,
        /// Also list distinct values of this column
        #[arg(long)]
        values: Option<String>,
    },
    /// Import a whole table
    #[command(name = "pg-import")]
    PgImport {
        #[command(flatten)]
        target: TableArgs,
        #[command(flatten)]
        drawing: DrawingArgs,
        #[command(flatten)]
        symbol: SymbolArgs,
    },
    /// Import the result of a query
    #[command(name = "pg-query-import")]
    PgQueryImport {
        #[command(flatten)]
        target: TableArgs,
        /// Columns to import, comma separated
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Condition `column operator value`, can be repeated
        #[arg(long = "where")]
        conditions: Vec<String>,
        /// Only features inside `xmin,ymin,xmax,ymax`, in drawing coordinates
        #[arg(long)]
        extent: Option<String>,
        /// SELECT statement to use instead of fields and conditions
        #[arg(long, conflicts_with_all = ["fields", "conditions", "extent"])]
        sql: Option<String>,
        #[command(flatten)]
        drawing: DrawingArgs,
        #[command(flatten)]
        symbol: SymbolArgs,
    },
    /// Import recorded layers again
    Refresh {
        /// Layer to refresh, can be repeated; all recorded layers if not set
        #[arg(long)]
        layer: Vec<String>,
        #[command(flatten)]
        drawing: DrawingArgs,
    },
    /// Inspect and edit the layer ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

#[derive(Args)]
struct LoginArgs {
    /// Account name
    #[arg(long)]
    username: String,
    /// Account password
    #[arg(long)]
    password: String,
    /// Portal REST url
    #[arg(long)]
    portal: Option<String>,
    /// Referer the token is issued for
    #[arg(long)]
    referer: Option<String>,
}

#[derive(Args)]
struct PgLoginArgs {
    /// Server host name
    #[arg(long)]
    host: String,
    /// Server port
    #[arg(long, default_value_t = 5432)]
    port: u16,
    /// Database name
    #[arg(long)]
    database: String,
    /// User name
    #[arg(long)]
    username: String,
    /// Password
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args)]
struct DrawingArgs {
    /// Drawing file, created if it does not exist
    #[arg(long)]
    drawing: PathBuf,
    /// Coordinate system of the drawing, from the settings if not set
    #[arg(long)]
    target_epsg: Option<i32>,
}

#[derive(Args)]
struct TableArgs {
    /// Table as schema.table
    #[arg(long)]
    table: String,
    /// Drawing layer, the table name if not set
    #[arg(long)]
    layer: Option<String>,
    /// Split into one layer per value of this column
    #[arg(long)]
    split_by: Option<String>,
}

#[derive(Args)]
struct SymbolArgs {
    /// Symbol for point layers
    #[arg(long)]
    symbol: Option<String>,
    /// Attribute used for the symbol labels
    #[arg(long, requires = "symbol")]
    label: Option<String>,
}

#[derive(Subcommand)]
enum LedgerCommand {
    /// List recorded layers
    List {
        /// Only layers that can be refreshed in this drawing
        #[arg(long)]
        drawing: Option<PathBuf>,
    },
    /// Forget a layer
    Remove {
        /// Layer name
        layer: String,
    },
    /// Forget layers of drawings that are not listed
    Prune {
        /// Drawings to keep records of
        #[arg(long = "open")]
        open: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    commands::run(cli).await
}
