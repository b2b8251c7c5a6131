use crate::config::generate::generate_starter_config;
use crate::config::parse::load_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    write_config(&generate_starter_config(), stdout)
}

fn write_config(config_content: &str, stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer ~/.config/atmon/config.yml, fall back to /etc/atmon/config.yml
    let config_path = dirs::home_dir()
        .map(|home| home.join(".config/atmon/config.yml"))
        .filter(|path| match path.parent() {
            Some(parent) => match fs::create_dir_all(parent) {
                Ok(()) => true,
                Err(_) => {
                    eprintln!("Warning: Could not create directory {}", parent.display());
                    eprintln!("Falling back to /etc/atmon/config.yml");
                    false
                }
            },
            None => false,
        })
        .unwrap_or_else(|| PathBuf::from("/etc/atmon/config.yml"));

    if config_path.exists() {
        eprintln!(
            "Error: Config file already exists at {}",
            config_path.display()
        );
        eprintln!("Remove it first or use --stdout to print the config");
        std::process::exit(1);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config file found. Use --config to specify a path.")?;

    println!("Validating config file: {}", path.display());
    let config = load_config(&path)?;

    let table = config.sink.table();
    println!("Config is valid");
    println!("  listen:    {}", config.server.listen);
    println!("  sink:      {:?} table {}", table.partitioning, table.table_id);
    println!(
        "  rotation:  {} bytes or {:?}",
        config.pipeline.size_threshold_bytes, config.pipeline.age_threshold
    );
    println!(
        "  geoip:     {}",
        if config.geoip.is_some() { "enabled" } else { "disabled" }
    );
    Ok(())
}
