#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use anyhow::Result;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Loopwall v{}", env!("CARGO_PKG_VERSION"));

    run()
}

#[cfg(windows)]
fn run() -> Result<()> {
    loopwall::shell::run()?;
    log::info!("Loopwall stopped");
    Ok(())
}

#[cfg(not(windows))]
fn run() -> Result<()> {
    log::error!("Unsupported OS: Loopwall draws its wallpaper through the Win32 desktop");
    anyhow::bail!("unsupported operating system")
}
