use anyhow::{Context, Result};
use parley_infrastructure::SettingsService;

pub fn show(service: &SettingsService) -> Result<()> {
    let settings = service.load().context("Failed to load settings")?;
    print!("{}", toml_text(&settings)?);
    Ok(())
}

pub fn path(service: &SettingsService) -> Result<()> {
    println!("{}", service.path().display());
    Ok(())
}

pub fn init(service: &SettingsService) -> Result<()> {
    if service.path().exists() {
        println!("Settings already exist at {}", service.path().display());
        return Ok(());
    }
    service
        .save(&Default::default())
        .with_context(|| format!("Failed to write {}", service.path().display()))?;
    println!("Wrote {}", service.path().display());
    Ok(())
}

fn toml_text(settings: &parley_core::settings::Settings) -> Result<String> {
    Ok(toml::to_string_pretty(settings)?)
}
