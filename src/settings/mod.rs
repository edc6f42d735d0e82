use clap::{Parser, Subcommand};

use sceneloader::resources::loader::DEFAULT_MAX_CONCURRENT_REQUESTS;

#[derive(Parser, Debug)]
#[command(name = "sceneloader")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Loads scene graphs from entity documents")]
pub struct CliArgs {
    #[arg(long, env = "SCENELOADER_DATA_DIR", default_value_t = default_data_dir())]
    pub data_dir: String,

    #[arg(long, env = "SCENELOADER_MAX_CONCURRENT", default_value_t = DEFAULT_MAX_CONCURRENT_REQUESTS)]
    pub max_concurrent: usize,

    /// Fail batches that are not complete after this many milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

pub fn default_data_dir() -> String {
    std::env::current_dir()
        .expect("Can't read current working directory!")
        .join("_data")
        .to_string_lossy()
        .to_string()
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Loads the given entities including their children and prints the resulting trees.
    Load {
        #[arg(required = true)]
        guids: Vec<String>,
    },
    /// Lists the entity documents in the data directory.
    List,
}
