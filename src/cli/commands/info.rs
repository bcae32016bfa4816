//! Info command implementation

use clap::Args;
use std::path::PathBuf;

use super::load_configuration;
use crate::core::Scrubber;

/// Arguments for the info command
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Slide file to describe
    pub path: PathBuf,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl InfoArgs {
    /// Execute the info command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let Some(config) = load_configuration(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        let scrubber = Scrubber::from_config(&config)?;

        let info = match scrubber.info(&self.path) {
            Ok(info) => info,
            Err(e) => {
                eprintln!("❌ {}: {e}", self.path.display());
                return Ok(3); // File failed
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(0);
        }

        println!("📄 {}", info.path.display());
        println!("  Format: {}", info.format);
        println!("  Size: {} bytes", info.file_size);
        if let Some(order) = &info.byte_order {
            println!("  Byte order: {order}");
        }
        if let Some(bigtiff) = info.bigtiff {
            println!("  BigTIFF: {bigtiff}");
        }
        println!("  Pages/elements: {}", info.page_count);
        if info.auxiliary_images.is_empty() {
            println!("  Auxiliary images: none");
        } else {
            println!("  Auxiliary images:");
            for image in &info.auxiliary_images {
                println!("    - {image}");
            }
        }
        for (key, value) in &info.details {
            println!("  {key}: {value}");
        }
        match info.clean {
            Some(true) => println!("  ✅ Clean"),
            Some(false) => println!("  ⚠️  Contains PHI"),
            None => {}
        }
        Ok(0)
    }
}
