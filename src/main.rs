mod answer_proxy;
mod cli;
mod config;
mod db;
mod deadline;
mod error;
mod list_query;
mod qa;
mod web;

use cli::Cli;
use log::error;

fn main() {
    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
