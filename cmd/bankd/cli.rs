use std::io::{self, Write};
use std::path::Path;

use bankd_config::BankConfig;
use clap::{ArgAction, Parser as ClapParser, Subcommand as ClapSubcommand};
use tracing::{Level, info, warn};

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[derive(ClapParser)]
#[command(
    name = "bankd",
    version = VERSION_STRING,
    about = "bankd peer-to-peer bank node"
)]
pub struct CLI {
    #[command(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Option<Subcommand>,
}

#[derive(ClapParser)]
pub struct Options {
    #[arg(
        long = "config",
        value_name = "CONFIG_FILE_PATH",
        default_value = "config.json",
        help = "Path to the JSON configuration file.",
        help_heading = "Node options"
    )]
    pub config_path: String,
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Node options"
    )]
    pub log_level: Level,
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(name = "removedb", about = "Remove the account database")]
    RemoveDB {
        #[arg(
            long = "force",
            help = "Force remove the database without confirmation",
            action = ArgAction::SetTrue
        )]
        force: bool,
    },
}

impl Subcommand {
    pub fn run(self, opts: &Options) -> eyre::Result<()> {
        match self {
            Subcommand::RemoveDB { force } => {
                let config = BankConfig::load(&opts.config_path)?;
                remove_db(&config.storage_path, force);
            }
        }
        Ok(())
    }
}

pub fn remove_db(storage_path: &str, force: bool) {
    let path = Path::new(storage_path);
    if !path.exists() {
        warn!("Database file does not exist: {storage_path}");
        return;
    }

    if !force {
        print!("Are you sure you want to remove the database? (y/n): ");
        io::stdout().flush().expect("flush stdout");

        let mut input = String::new();
        io::stdin().read_line(&mut input).expect("read stdin");
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Operation canceled.");
            return;
        }
    }

    std::fs::remove_file(path).expect("Failed to remove database file");
    info!("Database removed successfully");
}
