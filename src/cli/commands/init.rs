//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file with a fresh UID salt.

use clap::Args;
use rand::RngCore;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "slidescrub.toml")]
    pub output: String,

    /// Include every key with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Slidescrub configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let salt = generate_salt();
        let config_content = if self.with_examples {
            Self::generate_config_with_examples(&salt)
        } else {
            Self::generate_minimal_config(&salt)
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Keep the generated uid_salt secret and stable across runs");
                println!("  2. Validate configuration: slidescrub validate-config");
                println!("  3. Scan a slide: slidescrub scan <FILE>");
                println!("  4. Anonymize a copy: slidescrub anonymize <FILE> -o <OUT>");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5) // Fatal error exit code
            }
        }
    }

    fn generate_minimal_config(salt: &str) -> String {
        format!(
            r#"# Slidescrub Configuration File

[application]
log_level = "info"

[anonymize]
uid_salt = "{salt}"

[batch]
recursive = false
"#
        )
    }

    fn generate_config_with_examples(salt: &str) -> String {
        format!(
            r#"# Slidescrub Configuration File
# Every key is optional; the values below are the defaults.
# Any key can be overridden with SLIDESCRUB_<SECTION>_<KEY>,
# and ${{VAR}} references are substituted from the environment.

[application]
log_level = "info"          # trace | debug | info | warn | error
dry_run = false             # plan redactions without writing

[scan]
sweep_window_bytes = 1000000
scan_filenames = true
# pattern_library = "my_patterns.toml"

[anonymize]
verify = true               # re-scan outputs after redaction
verify_integrity = true     # compare diagnostic image digests
reset_timestamps = false    # set output mtime/atime to the epoch
unlink_auxiliary = true     # drop blanked label/macro pages from the chain
uid_salt = "{salt}"

[batch]
# workers = 8               # defaults to the number of CPUs
recursive = false
formats = []                # e.g. ["svs", "ndpi", "dcm"]

[audit]
enabled = false
log_path = "slidescrub-audit.jsonl"
json_format = true

[logging]
local_enabled = false
local_path = "./logs"
local_rotation = "daily"    # daily | hourly | never
"#
        )
    }
}

/// 32 random bytes, hex encoded
fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
