use std::path::{Path, PathBuf};

use clap::Parser;
use tiermem::config::Config;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Parser)]
pub enum ConfigSubcommand {
    #[clap(about = "Show the effective configuration")]
    Show,

    #[clap(about = "Check the configuration for invalid values")]
    Validate,

    #[clap(about = "Print a default config.toml")]
    Init,
}

impl ConfigCommand {
    pub async fn execute(
        &self,
        config_path: Option<&Path>,
        data_dir: Option<&Path>,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config_path, data_dir, format),
            ConfigSubcommand::Validate => Self::validate(config_path, data_dir, format),
            ConfigSubcommand::Init => Self::init(),
        }
    }

    fn show(config_path: Option<&Path>, data_dir: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = load_config(config_path, data_dir)?;

        match format {
            OutputFormat::Json => print_json(&config)?,
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (search paths or defaults)"),
                }
                println!("==============================\n");

                let value = toml::Value::try_from(&config)?;
                let Some(sections) = value.as_table() else {
                    return Ok(());
                };

                for (section, settings) in sections {
                    let Some(settings) = settings.as_table() else {
                        continue;
                    };
                    println!("[{section}]");
                    let mut table = new_table(["Setting", "Value"]);
                    for (key, value) in settings {
                        let shown = match value {
                            toml::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        table.add_row([key.as_str(), shown.as_str()]);
                    }
                    println!("{table}\n");
                }
            }
        }

        Ok(())
    }

    fn validate(
        config_path: Option<&Path>,
        data_dir: Option<&Path>,
        format: OutputFormat,
    ) -> CliResult<()> {
        let config = load_config(config_path, data_dir)?;
        config.validate()?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "valid": true }))?,
            OutputFormat::Table => println!("Configuration is valid."),
        }
        Ok(())
    }

    fn init() -> CliResult<()> {
        print!("{}", toml::to_string_pretty(&Config::default())?);
        Ok(())
    }
}

/// Load config the way the daemon does, then apply `--data-dir`
pub fn load_config(config_path: Option<&Path>, data_dir: Option<&Path>) -> CliResult<Config> {
    let mut config = Config::load(config_path)?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = PathBuf::from(dir);
    }
    Ok(config)
}
