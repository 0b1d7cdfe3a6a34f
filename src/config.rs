use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub owner_ids: Vec<u64>,
    pub database_url: String,
    pub panel_key: Option<String>,
    pub port: u16,
}

#[derive(Debug)]
pub struct ConfigError {
    pub missing_vars: Vec<String>,
    pub invalid_vars: Vec<(String, String)>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.missing_vars.is_empty() {
            writeln!(f, "Missing required environment variables:")?;
            for var in &self.missing_vars {
                writeln!(f, "  - {}", var)?;
            }
        }
        if !self.invalid_vars.is_empty() {
            writeln!(f, "Invalid environment variables:")?;
            for (var, err) in &self.invalid_vars {
                writeln!(f, "  - {}: {}", var, err)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

fn get_required(name: &str, missing: &mut Vec<String>) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => {
            missing.push(name.to_string());
            None
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        let bot_token = get_required("BOT_TOKEN", &mut missing);
        let database_url = get_required("DATABASE_URL", &mut missing);
        let owner_ids_raw = get_required("OWNER_IDS", &mut missing);

        let owner_ids = owner_ids_raw
            .as_ref()
            .map(|raw| parse_owner_ids(raw, &mut invalid))
            .unwrap_or_default();

        let panel_key = match env::var("PANEL_KEY") {
            Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
            _ => None,
        };

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse::<u16>()
            .map_err(|e| {
                invalid.push(("PORT".into(), e.to_string()));
            })
            .unwrap_or(8080);

        if !missing.is_empty() || !invalid.is_empty() {
            return Err(ConfigError {
                missing_vars: missing,
                invalid_vars: invalid,
            });
        }

        Ok(Self {
            bot_token: bot_token.unwrap(),
            owner_ids,
            database_url: database_url.unwrap(),
            panel_key,
            port,
        })
    }
}

fn parse_owner_ids(raw: &str, invalid: &mut Vec<(String, String)>) -> Vec<u64> {
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.parse::<u64>() {
            Ok(id) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            Err(e) => invalid.push(("OWNER_IDS".into(), format!("{}: {}", part, e))),
        }
    }
    if ids.is_empty() {
        invalid.push(("OWNER_IDS".into(), "no valid owner ids".into()));
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_owner_ids() {
        let mut invalid = Vec::new();
        let ids = parse_owner_ids("123, 456,,789", &mut invalid);
        assert_eq!(ids, vec![123, 456, 789]);
        assert!(invalid.is_empty());
    }

    #[test]
    fn deduplicates_owner_ids() {
        let mut invalid = Vec::new();
        let ids = parse_owner_ids("5,5,5", &mut invalid);
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn rejects_non_numeric_owner_ids() {
        let mut invalid = Vec::new();
        parse_owner_ids("abc", &mut invalid);
        assert!(!invalid.is_empty());
    }
}
