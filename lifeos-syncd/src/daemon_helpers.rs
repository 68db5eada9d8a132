fn oauth_client_from_env(base_url: Option<&str>) -> anyhow::Result<Option<OAuthClient>> {
    match (
        std::env::var("LIFEOS_EDUPLANR_CLIENT_ID"),
        std::env::var("LIFEOS_EDUPLANR_CLIENT_SECRET"),
    ) {
        (Ok(client_id), Ok(client_secret)) => Ok(Some(match base_url {
            Some(url) => OAuthClient::with_base_url(url, client_id, client_secret)
                .context("invalid oauth base url/config")?,
            None => OAuthClient::new(client_id, client_secret).context("invalid oauth config")?,
        })),
        _ => Ok(None),
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn read_list_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|value| parse_list(&value))
        .unwrap_or_default()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusChange {
    user_id: String,
    provider: String,
    status: String,
    last_error: String,
}

/// Diffs the current configs against the last emitted state and returns the
/// pairs whose status or error changed. Pairs that disappeared are forgotten.
fn status_changes(
    last_seen: &mut HashMap<(String, String), (String, String)>,
    configs: &[IntegrationConfig],
) -> Vec<StatusChange> {
    let mut changes = Vec::new();
    let mut current = HashMap::with_capacity(configs.len());
    for config in configs {
        let key = (config.user_id.clone(), config.provider.clone());
        let value = (
            config.status.as_str().to_string(),
            config.last_error.clone().unwrap_or_default(),
        );
        if last_seen.get(&key) != Some(&value) {
            changes.push(StatusChange {
                user_id: key.0.clone(),
                provider: key.1.clone(),
                status: value.0.clone(),
                last_error: value.1.clone(),
            });
        }
        current.insert(key, value);
    }
    *last_seen = current;
    changes
}
