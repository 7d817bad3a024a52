/// clap command definitions and handlers.
pub mod cli;
