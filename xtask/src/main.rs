use clap::{Parser, Subcommand};

use crate::fuzz::Fuzz;

mod build;
mod doc;
mod fuzz;
mod run;
mod test;

#[derive(Parser)]
#[command(about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build all crates in workspace
    Build {
        /// Build with release profile
        #[arg(short, long, default_value_t = false)]
        release: bool,

        /// Build with target architecture
        #[arg(short, long, default_value = "x86_64-unknown-uefi")]
        target: String,
    },

    /// Build docs for the refit-rs crates
    Doc {
        /// Document private items in crate
        #[arg(short, long, default_value_t = false)]
        private: bool,

        /// Open in web browser after documenting
        #[arg(short, long, default_value_t = false)]
        open: bool,
    },

    /// Run refit-rs in VM with uefi-run
    Run {
        /// Path to the OVMF code file
        #[arg(long)]
        ovmf_code: Option<String>,

        /// Build with release profile
        #[arg(short, long, default_value_t = false)]
        release: bool,

        /// Add an additional file to the root of the image, such as refit-rs.conf
        #[arg(long)]
        add_file: Option<String>,
    },

    /// Run unit tests and clippy on host
    Test,

    /// Run a fuzz target with cargo-fuzz
    Fuzz {
        #[command(subcommand)]
        command: Fuzz,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Build { release, target } => build::build_all_crates(release, &target)?,
        Commands::Doc { private, open } => doc::doc_crate(private, open)?,
        Commands::Run {
            ovmf_code,
            release,
            add_file,
        } => run::run_refit(ovmf_code.as_deref(), release, add_file.as_deref())?,
        Commands::Test => test::test_on_host()?,
        Commands::Fuzz { command } => fuzz::fuzz_parsers(command)?,
    }
    Ok(())
}
