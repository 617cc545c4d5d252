use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

const DEFAULT_CLASSIFICATIONS: &[&str] = &[
    "News", "Tech", "Dev", "Crypto", "Music", "Movies", "Books", "Games", "Life", "Study",
    "Travel", "Other",
];

/// Typed configuration for the index bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub creator: UserId,
    pub approve_group_id: ChatId,
    pub bulletin_channel_id: ChatId,

    // Storage
    pub data_dir: PathBuf,
    pub reply_file: Option<PathBuf>,

    // Directory
    pub classifications: Vec<String>,
    pub page_size: usize,

    // Memory
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub await_ttl: Duration,
    pub auto_delete_msg_cycle: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an explicit key/value map (tests, embedding).
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let creator = UserId(required_i64(&get, "BOT_CREATOR")?);
        let approve_group_id = ChatId(required_i64(&get, "APPROVE_GROUP_ID")?);
        let bulletin_channel_id = ChatId(required_i64(&get, "BULLETIN_CHANNEL_ID")?);

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let reply_file = get("REPLY_FILE").and_then(non_empty).map(PathBuf::from);

        let mut classifications = parse_csv(get("CLASSIFICATIONS"));
        if classifications.is_empty() {
            classifications = DEFAULT_CLASSIFICATIONS
                .iter()
                .map(|s| s.to_string())
                .collect();
        }

        let page_size = parse_num::<usize>(&get, "LIST_PAGE_SIZE")?
            .unwrap_or(10)
            .max(1);
        let cache_capacity = parse_num::<usize>(&get, "SEARCH_CACHE_CAPACITY")?.unwrap_or(200);
        let cache_ttl =
            Duration::from_secs(parse_num::<u64>(&get, "SEARCH_CACHE_TTL")?.unwrap_or(300));
        let await_ttl = Duration::from_secs(parse_num::<u64>(&get, "AWAIT_TTL")?.unwrap_or(300));
        let auto_delete_msg_cycle =
            Duration::from_secs(parse_num::<u64>(&get, "AUTO_DELETE_MSG_CYCLE")?.unwrap_or(20));

        Ok(Self {
            telegram_bot_token,
            creator,
            approve_group_id,
            bulletin_channel_id,
            data_dir,
            reply_file,
            classifications,
            page_size,
            cache_capacity,
            cache_ttl,
            await_ttl,
            auto_delete_msg_cycle,
        })
    }
}

fn required_i64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<i64> {
    let raw = get(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("{key} must be a numeric chat id, got {raw:?}")))
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = get(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}")))
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> HashMap<String, String> {
        [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("BOT_CREATOR", "42"),
            ("APPROVE_GROUP_ID", "-1001"),
            ("BULLETIN_CHANNEL_ID", "-1002"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_map(&base()).unwrap();
        assert_eq!(cfg.creator, UserId(42));
        assert_eq!(cfg.approve_group_id, ChatId(-1001));
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert!(cfg.classifications.iter().any(|c| c == "Tech"));
    }

    #[test]
    fn overrides_and_csv() {
        let mut vars = base();
        vars.insert("CLASSIFICATIONS".into(), " A , B,,C ".into());
        vars.insert("SEARCH_CACHE_CAPACITY".into(), "3".into());
        let cfg = Config::from_map(&vars).unwrap();
        assert_eq!(cfg.classifications, vec!["A", "B", "C"]);
        assert_eq!(cfg.cache_capacity, 3);
    }

    #[test]
    fn missing_or_bad_values_fail() {
        let mut vars = base();
        vars.remove("APPROVE_GROUP_ID");
        assert!(matches!(Config::from_map(&vars), Err(Error::Config(_))));

        let mut vars = base();
        vars.insert("LIST_PAGE_SIZE".into(), "ten".into());
        assert!(matches!(Config::from_map(&vars), Err(Error::Config(_))));
    }
}
