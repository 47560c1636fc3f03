use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Крейты, чей уровень поднимают флаги `-v`. HTTP-стек остаётся на базовом.
const OWN_CRATES: [&str; 2] = ["market_client", "market_cli"];

/// Строит директиву фильтра: базовый уровень для всего, а каждый `-v`
/// поднимает уровень клиента и CLI на ступень.
pub fn filter_directive(base: &str, verbose: u8) -> String {
    let base = base.trim();
    let base = if base.is_empty() { "info" } else { base };
    if verbose == 0 {
        return base.to_string();
    }

    let from = LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(base))
        .unwrap_or(2);
    let own = LEVELS[(from + verbose as usize).min(LEVELS.len() - 1)];

    let mut directive = base.to_string();
    for krate in OWN_CRATES {
        directive.push_str(&format!(",{krate}={own}"));
    }
    directive
}

/// Логи идут в stderr, чтобы не смешиваться с JSON-выводом команд.
pub fn init_logging(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(())
}
