use anyhow::Result;
use colored::Colorize;
use logsearch::config::{self, Config};
use logsearch::logging::SensitiveToken;

/// Execute the check command
///
/// Validates the environment configuration without starting the server
pub fn execute() -> Result<()> {
    println!("{}", "Checking configuration...".yellow());

    let cfg = config::load_config()?;

    println!("{}", "✓ Configuration is valid".green());
    for warning in cfg.warnings() {
        println!("{} {}", "⚠".yellow(), warning.yellow());
    }
    println!();
    print_summary(&cfg);

    Ok(())
}

fn print_summary(cfg: &Config) {
    println!("{}", "Configuration Summary:".bold());
    println!("  {}: {}", "Listen".cyan(), cfg.server.listen_addr);
    println!("  {}: {:?}", "Log Format".cyan(), cfg.server.log_format);
    println!("  {}: {}", "Max Page Size".cyan(), cfg.server.max_page_size);
    println!(
        "  {}: {}s",
        "Ingest Timeout".cyan(),
        cfg.server.ingest_timeout.as_secs()
    );
    println!();

    println!("  {}: {}", "Database".cyan(), cfg.storage.conn_str);
    if cfg.storage.disk_capacity_gb > 0 {
        println!("  {}: {} GB", "Disk Capacity".cyan(), cfg.storage.disk_capacity_gb);
    } else {
        println!("  {}: {}", "Disk Capacity".cyan(), "unlimited".dimmed());
    }
    println!();

    println!(
        "  {}: {}",
        "Ingest Token".cyan(),
        SensitiveToken::new(&cfg.auth.ingest_token)
    );
    println!(
        "  {}: {}",
        "Query Token".cyan(),
        SensitiveToken::new(&cfg.auth.query_token)
    );
    println!();

    let filters = &cfg.ingest_filters;
    if filters.is_empty() {
        println!("  {}: {}", "Ingest Filters".cyan(), "none".dimmed());
        return;
    }
    println!("{}", "  Ingest Filters:".cyan());
    for pattern in &filters.api_name_include {
        println!("    {} {}", "include".green(), pattern);
    }
    for pattern in &filters.api_name_exclude {
        println!("    {} {}", "exclude".red(), pattern);
    }
}
