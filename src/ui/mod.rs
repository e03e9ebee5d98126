// Wed Jan 15 2026 - Alex

pub mod cli;

pub use cli::{Args, Command, CommandHandler};

pub fn print_error(message: &str) {
    use colored::Colorize;
    eprintln!("{} {}", "[ERROR]".red(), message);
}
