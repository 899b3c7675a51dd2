use super::error::RuleSetError;
use super::types::RuleSet;
use std::path::Path;

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Load and validate the rule set at `path`. `.json` files are JSON,
/// anything else is TOML.
pub fn load_rules(path: &Path) -> Result<RuleSet, RuleSetError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuleSetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = parse_rules(&content, is_json(path))?;
    log_info!("[Rules] Loaded {} rule(s) from {}", rules.len(), path.display());
    Ok(rules)
}

pub fn parse_rules(content: &str, json: bool) -> Result<RuleSet, RuleSetError> {
    let rules: RuleSet = if json {
        serde_json::from_str(content)?
    } else {
        toml::from_str(content)?
    };
    rules.validate()?;
    Ok(rules)
}

pub fn save_rules(path: &Path, rules: &RuleSet) -> Result<(), RuleSetError> {
    let content = if is_json(path) {
        serde_json::to_string_pretty(rules)?
    } else {
        toml::to_string_pretty(rules)?
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| RuleSetError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| RuleSetError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log_info!("[Rules] Saved {} rule(s) to {}", rules.len(), path.display());
    Ok(())
}
