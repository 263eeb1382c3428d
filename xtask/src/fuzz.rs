use clap::Subcommand;
use duct::cmd;

#[derive(Subcommand)]
pub enum Fuzz {
    /// Run refit-rs.conf parser
    Config,

    /// Run refit_linux.conf parser
    Options,

    /// Run Boot#### load option parser
    LoadOption,

    /// Run PE/COFF header check
    Header,

    /// Run MBR partition activation
    Mbr,
}

pub fn fuzz_parsers(command: Fuzz) -> anyhow::Result<()> {
    let mut args = vec!["fuzz", "run"];
    match command {
        Fuzz::Config => args.push("config"),
        Fuzz::Options => args.push("options"),
        Fuzz::LoadOption => args.push("load_option"),
        Fuzz::Header => args.push("header"),
        Fuzz::Mbr => args.push("mbr"),
    }

    cmd!("cargo", "install", "cargo-fuzz").run()?; // will not install if its already installed
    cmd("cargo", args).run()?;
    Ok(())
}
