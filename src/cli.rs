use clap::Parser;
use std::path::PathBuf;

use crate::api::{DEFAULT_API_BASE, DEFAULT_MODEL_ID};
use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Debug, Parser)]
#[clap(
    name = "gemini-cli",
    version = "0.1.0",
    about = "Ask Google's Gemini models questions from the terminal. Starts an interactive prompt if no COMMAND is given."
)]
pub struct Cli {
    #[clap(
        value_name = "COMMAND",
        help = "One of: setkey, ask, resetkey, help"
    )]
    pub args: Vec<String>,

    #[clap(
        long("config"),
        value_name = "FILEPATH",
        help = "The file the API key is stored in",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config_file: PathBuf,

    #[clap(
        long("model"),
        value_name = "MODEL_ID",
        help = "Sets the model to use for generating responses",
        default_value = DEFAULT_MODEL_ID
    )]
    pub model_id: String,

    #[clap(
        long("api"),
        value_name = "URL",
        help = "The API endpoint base URL to use",
        default_value = DEFAULT_API_BASE
    )]
    pub api: String,
}
