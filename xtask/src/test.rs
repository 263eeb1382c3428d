use duct::cmd;

pub fn test_on_host() -> anyhow::Result<()> {
    cmd!("cargo", "clippy", "--package", "refit-rs-core", "--", "-C", "panic=abort").run()?;
    cmd!("cargo", "test", "--package", "refit-rs-core", "--lib").run()?;
    Ok(())
}
