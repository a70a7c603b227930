use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

const SYSTEM_CONFIG: &str = "/etc/drain/config.yml";

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer the per-user location, fall back to the system one
    let config_path = match crate::config::user_config_path() {
        Some(user_config) => match user_config.parent().map(fs::create_dir_all) {
            Some(Err(e)) => {
                eprintln!("Warning: Could not create directory for {}: {}", user_config.display(), e);
                eprintln!("Falling back to {}", SYSTEM_CONFIG);
                PathBuf::from(SYSTEM_CONFIG)
            }
            _ => user_config,
        },
        None => PathBuf::from(SYSTEM_CONFIG),
    };

    write_new(&config_path, &config_content)?;
    println!("Config file written to {}", config_path.display());
    Ok(())
}

/// Write `content` to `path`, refusing to replace an existing file
fn write_new(path: &std::path::Path, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "config file already exists at {}\nRemove it first or use --stdout to print the config",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

pub fn validate(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config file found. Use --config to specify a path.")?;

    println!("Validating config file: {}", path.display());

    let config = crate::config::load_config(&path)?;
    println!("✓ Config is valid");
    for destination in &config.destinations {
        println!("  destination {}", destination.label());
    }
    Ok(())
}
