//! Config subcommand handlers. None of these touch the store or devices.

use dialoguer::{Input, Select};

use netorch_config::Config;

use crate::cli::{ConfigCommand, GlobalOpts, SecretKind};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::{self, prompt_err};

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// `cfg` with plaintext secrets masked.
fn masked(mut cfg: Config) -> Config {
    if cfg.store.api_key.is_some() {
        cfg.store.api_key = Some(MASK.into());
    }
    if cfg.routeros.password.is_some() {
        cfg.routeros.password = Some(MASK.into());
    }
    cfg
}

fn to_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# unrenderable config: {e}"))
}

/// Offer keyring storage. Returns the secret back when the operator
/// chooses the plaintext config file instead.
fn store_or_inline(secret: &str, key: &str, label: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt(format!("Where to store the {label}?"))
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        netorch_config::store_secret(key, secret)?;
        eprintln!("{label} stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(secret.to_owned()))
    }
}

fn prompt_secret(prompt: &str) -> Result<String, CliError> {
    rpassword::prompt_password(prompt).map_err(prompt_err)
}

fn init_wizard(mut cfg: Config) -> Result<Config, CliError> {
    // 1. Billing store
    let url: String = Input::new()
        .with_prompt("Billing store URL (PostgREST endpoint)")
        .with_initial_text(cfg.store.url.clone().unwrap_or_default())
        .interact_text()
        .map_err(prompt_err)?;
    let parsed = url::Url::parse(&url).map_err(|e| CliError::Validation {
        field: "store.url".into(),
        reason: format!("{url}: {e}"),
    })?;
    cfg.store.url = Some(parsed.to_string());

    let key = prompt_secret("Store API key: ")?;
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "store.api_key".into(),
            reason: "API key cannot be empty".into(),
        });
    }
    cfg.store.api_key = store_or_inline(&key, "store", "API key")?;

    // 2. Default RouterOS credentials
    cfg.routeros.username = Input::new()
        .with_prompt("RouterOS username")
        .default(cfg.routeros.username.clone())
        .interact_text()
        .map_err(prompt_err)?;
    let password = prompt_secret("RouterOS password (empty for none): ")?;
    cfg.routeros.password = if password.is_empty() {
        None
    } else {
        store_or_inline(&password, "routeros", "RouterOS password")?
    };

    // 3. Discovery and accounting
    let ranges: String = Input::new()
        .with_prompt("Discovery ranges (comma-separated CIDRs, empty to skip)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    cfg.monitor.network_ranges = ranges
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .collect();

    cfg.usage.timezone = Input::new()
        .with_prompt("Billing timezone (IANA name)")
        .default(cfg.usage.timezone.clone())
        .interact_text()
        .map_err(prompt_err)?;

    // Reject anything the orchestrator would refuse later.
    cfg.network_ranges()?;
    cfg.timezone()?;
    Ok(cfg)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(command: ConfigCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);
    match command {
        ConfigCommand::Init => {
            eprintln!("netorch configuration wizard");
            eprintln!("  Config path: {}\n", path.display());
            if path.exists()
                && !util::confirm("A config file already exists. Overwrite it?", global.yes)?
            {
                return Ok(());
            }
            let cfg = init_wizard(config::load(global)?)?;
            netorch_config::save_config_to(&cfg, &path)?;
            eprintln!("Configuration saved to {}", path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = masked(config::load(global)?);
            let out = output::render_single(&global.output, &cfg, to_toml, |c| {
                c.store.url.clone().unwrap_or_default()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), false);
            Ok(())
        }

        ConfigCommand::SetSecret { secret } => {
            let (key, label) = match secret {
                SecretKind::Store => ("store", "store API key"),
                SecretKind::Routeros => ("routeros", "RouterOS password"),
            };
            let value = prompt_secret(&format!("{label}: "))?;
            if value.is_empty() {
                return Err(CliError::Validation {
                    field: key.into(),
                    reason: "secret cannot be empty".into(),
                });
            }
            netorch_config::store_secret(key, &value)?;
            if !global.quiet {
                eprintln!("{label} stored in system keyring");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_masks_plaintext_secrets() {
        let mut cfg = Config::default();
        cfg.store.url = Some("https://billing.example.net/rest/v1".into());
        cfg.store.api_key = Some("sk-live-123".into());
        cfg.routeros.password = Some("hunter2".into());

        let text = to_toml(&masked(cfg));
        assert!(!text.contains("sk-live-123"));
        assert!(!text.contains("hunter2"));
        assert!(text.contains(MASK));
        assert!(text.contains("billing.example.net"));
    }
}
