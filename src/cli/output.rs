use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// One compact JSON document per line
pub fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("Failed to serialize output")?;
    println!("{line}");
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let doc = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{doc}");
    Ok(())
}
