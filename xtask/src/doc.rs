use duct::cmd;

pub fn doc_crate(private: bool, open: bool) -> anyhow::Result<()> {
    let mut build_args = vec!["doc", "--package", "refit-rs-core", "--target", "x86_64-unknown-uefi"];
    if private {
        build_args.push("--document-private-items");
    }
    if open {
        build_args.push("--open");
    }

    cmd("cargo", build_args).run()?;
    Ok(())
}
