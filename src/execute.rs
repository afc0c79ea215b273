use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use anyhow::{bail, Result};
use colored::Colorize;
use reqwest::blocking::Client;
use toolpin::cache::{remove_cached_version, resolve_base_dir};
use toolpin::checksum::{sha256_file, verify};
use toolpin::loader::load_descriptor;
use toolpin::platform::resolve_platform;
use toolpin::{ApprovalRequest, Hooks, HostPlatform, Mode, Provisioner, ProvisionerConfig};
use crate::cli::{ToolpinCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let config = load_config(cli.config)?;
    match cli.command {
        ToolpinCommand::Acquire { name, descriptor, yes, headless, download_dir } => {
            execute_acquire(config, &name, &descriptor, yes, headless, download_dir)
        }
        ToolpinCommand::List { descriptor } => {
            execute_list(&descriptor)
        }
        ToolpinCommand::Which { name, descriptor, download_dir } => {
            execute_which(config, &name, &descriptor, download_dir)
        }
        ToolpinCommand::Verify { file, sha256 } => {
            execute_verify(&file, &sha256)
        }
        ToolpinCommand::Clean { name, descriptor, download_dir } => {
            execute_clean(config, &name, &descriptor, download_dir)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ProvisionerConfig> {
    let path = match path {
        Some(path) => path,
        None => ProvisionerConfig::default_path()?,
    };
    ProvisionerConfig::load_or_default(path)
}

fn with_download_dir(mut config: ProvisionerConfig, download_dir: Option<PathBuf>) -> ProvisionerConfig {
    if download_dir.is_some() {
        config.download_dir = download_dir;
    }
    config
}

pub fn execute_acquire(
    config: ProvisionerConfig,
    name: &str,
    descriptor: &str,
    yes: bool,
    headless: bool,
    download_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = with_download_dir(config, download_dir);
    if headless {
        config.mode = Mode::Headless;
    }
    let provisioner = Provisioner::new(config)?;
    let hooks = Hooks::new()
        .with_progress(|fraction: f64| {
            eprint!("\r{} {:>3.0}%", "Downloading".cyan(), fraction * 100.0);
        })
        .with_approval(move |request: &ApprovalRequest| yes || prompt(request));

    let instance = provisioner.acquire_blocking_with(name, descriptor, hooks)?;
    if instance.was_downloaded {
        eprintln!();
        println!("{} {}", "Downloaded".green(), instance.command_path.display());
    } else {
        println!("{}", instance.command_path.display());
    }
    Ok(())
}

fn prompt(request: &ApprovalRequest) -> bool {
    eprintln!("{}", request.title().bold());
    eprint!("{} [y/N] ", request.message().yellow());
    if io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

pub fn execute_list(descriptor: &str) -> Result<()> {
    let loaded = load_descriptor(descriptor, &Client::new())?;
    let host = HostPlatform::current().ok();
    if loaded.tools.is_empty() {
        println!("No tools");
        return Ok(());
    }

    let mut names: Vec<&String> = loaded.tools.keys().collect();
    names.sort();
    for name in names {
        let tool = &loaded.tools[name];
        println!("{}: {}", name.bold(), tool.required_version);
        let resolved = host
            .as_ref()
            .and_then(|host| resolve_platform(name, tool, host).ok());
        let mut keys: Vec<&String> = tool.platforms.keys().collect();
        keys.sort();
        for key in keys {
            let platform = &tool.platforms[key];
            let marker = match resolved {
                Some(resolved) if std::ptr::eq(resolved, platform) => "*".green().to_string(),
                _ => " ".to_string(),
            };
            println!(" {marker} {key}: {}", platform.url);
        }
        println!();
    }
    Ok(())
}

pub fn execute_which(config: ProvisionerConfig, name: &str, descriptor: &str, download_dir: Option<PathBuf>) -> Result<()> {
    let config = ProvisionerConfig {
        mode: Mode::Headless,
        ..with_download_dir(config, download_dir)
    };
    let path = Provisioner::new(config)?.cache_path(name, descriptor)?;
    if path.exists() {
        println!("Found executable at: {}", path.display());
    } else {
        println!("Not cached: {}", path.display());
    }
    Ok(())
}

pub fn execute_verify(file: &Path, sha256: &str) -> Result<()> {
    if verify(file, sha256)? {
        println!("{} {}", "OK".green(), file.display());
        return Ok(());
    }
    bail!(
        "Checksum mismatch for {}: expected {}, got {}",
        file.display(),
        sha256.trim(),
        sha256_file(file)?
    )
}

pub fn execute_clean(config: ProvisionerConfig, name: &str, descriptor: &str, download_dir: Option<PathBuf>) -> Result<()> {
    let config = with_download_dir(config, download_dir);
    let loaded = load_descriptor(descriptor, &Client::new())?;
    let tool = loaded.tool(name)?;
    let base_dir = resolve_base_dir(&tool.base_dir, &config.home_replacement()?);
    if remove_cached_version(&base_dir, &tool.required_version)? {
        println!("Removed {name} {}", tool.required_version);
    } else {
        println!("Nothing cached for {name} {}", tool.required_version);
    }
    Ok(())
}
