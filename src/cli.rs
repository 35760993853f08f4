use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sealedctl", about = "Decode and encode discriminated JSON hierarchies")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a hierarchy file and print its label table
    Check {
        /// Hierarchy file (JSON)
        hierarchy: PathBuf,
    },

    /// Decode newline-delimited JSON documents into variants
    Decode {
        /// Hierarchy file (JSON)
        hierarchy: PathBuf,

        /// Input file; stdin when omitted
        input: Option<PathBuf>,

        /// Reject unknown names while decoding subtype bodies
        #[arg(long)]
        strict: bool,
    },

    /// Encode newline-delimited variants into discriminated JSON
    Encode {
        /// Hierarchy file (JSON)
        hierarchy: PathBuf,

        /// Input file; stdin when omitted
        input: Option<PathBuf>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Check { .. } => "check",
            Command::Decode { .. } => "decode",
            Command::Encode { .. } => "encode",
        }
    }
}
