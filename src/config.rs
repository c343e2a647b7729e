use crate::engine::{ReplacePolicy, RuleSource};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub updates: UpdateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub url: String,
    pub name: String,
    #[serde(default = "default_source_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateConfig {
    #[serde(default = "default_update_interval")]
    pub interval_hours: u64,
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// When a refresh parses no rules of some kind, keep the previous ones.
    #[serde(default = "default_keep_stale_categories")]
    pub keep_stale_categories: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

// Defaults
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_source_enabled() -> bool {
    true
}
fn default_cache_capacity() -> u64 {
    10000
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_update_interval() -> u64 {
    6
}
fn default_concurrent_downloads() -> usize {
    4
}
fn default_fetch_timeout() -> u64 {
    60
}
fn default_keep_stale_categories() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}

const DEFAULT_SOURCES: &[(&str, &str)] = &[
    ("Scam Blocklist", "https://raw.githubusercontent.com/durablenapkin/scamblocklist/refs/heads/master/adguard.txt"),
    ("Dan Pollock's List", "https://someonewhocares.org/hosts/zero/hosts"),
    ("Peter Lowe's List", "https://pgl.yoyo.org/adservers/serverlist.php?hostformat=adblockplus&showintro=1&mimetype=plaintext"),
    ("WindowsSpyBlocker", "https://raw.githubusercontent.com/crazy-max/WindowsSpyBlocker/refs/heads/master/data/hosts/spy.txt"),
    ("DaSheng Ad Clean", "https://raw.githubusercontent.com/jdlingyu/ad-wars/master/hosts"),
    ("AdGuard Base", "https://raw.githubusercontent.com/AdguardTeam/FiltersRegistry/master/filters/filter_2_Base/filter.txt"),
    ("AdGuard CNAME disguised tracker list", "https://raw.githubusercontent.com/AdguardTeam/cname-trackers/master/data/combined_disguised_trackers.txt"),
    ("AdGuard DNS filter", "https://adguardteam.github.io/AdGuardSDNSFilter/Filters/filter.txt"),
    ("AdditionalFiltersCN", "https://raw.githubusercontent.com/Crystal-RainSlide/AdditionalFiltersCN/master/CN.txt"),
    ("ADgk mobile ad rules", "https://raw.githubusercontent.com/banbendalao/ADgk/master/ADgk.txt"),
    ("ChengFeng ad filter rules", "https://raw.githubusercontent.com/xinggsf/Adblock-Plus-Rule/master/rule.txt"),
    ("ChengFeng video filter rules", "https://raw.githubusercontent.com/xinggsf/Adblock-Plus-Rule/master/mv.txt"),
    ("HalfLife merged rules", "https://raw.githubusercontent.com/o0HalfLife0o/list/master/ad.txt"),
    ("AdAway official ad-blocking Host rules", "https://adaway.org/hosts.txt"),
    ("Remove anti-adblock warning rules", "https://easylist-downloads.adblockplus.org/antiadblockfilters.txt"),
    ("XingShao AdRules DNS List", "https://raw.githubusercontent.com/Cats-Team/AdRules/main/dns.txt"),
    ("AdGuard blackmatrix7 merged", "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/refs/heads/master/rule/AdGuard/Advertising/Advertising.txt"),
    ("Zhihu standard version", "https://raw.githubusercontent.com/zsakvo/AdGuard-Custom-Rule/master/rule/zhihu.txt"),
    ("Youtube-Adfilter-Web", "https://raw.githubusercontent.com/timlu85/AdGuard-Home_Youtube-Adfilter/master/Youtube-Adfilter-Web.txt"),
    ("Autumn Wind ad rules", "https://raw.githubusercontent.com/TG-Twilight/AWAvenue-Ads-Rule/main/AWAvenue-Ads-Rule.txt"),
    ("koolproxy adg rules", "https://raw.githubusercontent.com/ilxp/koolproxy/refs/heads/main/rules/adg.txt"),
    ("koolproxy antiad rules", "https://raw.githubusercontent.com/ilxp/koolproxy/refs/heads/main/rules/antiad.txt"),
    ("uBlock filters", "https://raw.githubusercontent.com/uBlockOrigin/uAssets/refs/heads/master/filters/filters.txt"),
    ("uBlock filters - Badware risks", "https://ublockorigin.pages.dev/filters/badware.txt"),
    ("uBlock filters - Privacy", "https://raw.githubusercontent.com/uBlockOrigin/uAssetsCDN/refs/heads/main/filters/privacy.min.txt"),
    ("uBlock filters - Quick fixes", "https://ublockorigin.github.io/uAssets/filters/quick-fixes.txt"),
    ("uBlock filters - Resource abuse", "https://raw.githubusercontent.com/uBlockOrigin/uAssets/refs/heads/master/filters/resource-abuse.txt"),
    ("uBlock filters - Unbreak", "https://raw.githubusercontent.com/uBlockOrigin/uAssetsCDN/refs/heads/main/filters/unbreak.txt"),
    ("AdGuard Mobile Ads", "https://filters.adtidy.org/extension/ublock/filters/11.txt"),
    ("Block PCDN domains", "https://raw.githubusercontent.com/thhbdd/Block-pcdn-domains/refs/heads/main/ban.txt"),
    ("anti-AD", "https://anti-ad.net/easylist.txt"),
    ("anti-AD PCDN rules", "https://raw.githubusercontent.com/privacy-protection-tools/anti-AD/refs/heads/master/discretion/pcdn.txt"),
    ("anti-AD httpdns", "https://raw.githubusercontent.com/privacy-protection-tools/anti-AD/refs/heads/master/discretion/dns.txt"),
];

fn default_sources() -> Vec<SourceConfig> {
    DEFAULT_SOURCES
        .iter()
        .map(|(name, url)| SourceConfig {
            url: url.to_string(),
            name: name.to_string(),
            enabled: true,
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sources: default_sources(),
            cache: CacheConfig::default(),
            updates: UpdateConfig::default(),
            logging: LoggingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_update_interval(),
            concurrent_downloads: default_concurrent_downloads(),
            fetch_timeout_secs: default_fetch_timeout(),
            keep_stale_categories: default_keep_stale_categories(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl UpdateConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn replace_policy(&self) -> ReplacePolicy {
        if self.keep_stale_categories {
            ReplacePolicy::KeepNonEmpty
        } else {
            ReplacePolicy::Overwrite
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    /// Configured sources as fresh metadata records. A URL listed twice keeps
    /// its last entry.
    pub fn initial_sources(&self) -> Vec<RuleSource> {
        let mut list: Vec<RuleSource> = Vec::with_capacity(self.sources.len());
        for s in &self.sources {
            list.retain(|existing| existing.url != s.url);
            list.push(RuleSource::new(s.url.clone(), s.name.clone(), s.enabled));
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache.capacity, 10000);
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.updates.interval(), Duration::from_secs(6 * 3600));
        assert_eq!(config.updates.fetch_timeout(), Duration::from_secs(60));
        assert_eq!(config.updates.replace_policy(), ReplacePolicy::KeepNonEmpty);
        assert_eq!(config.sources.len(), DEFAULT_SOURCES.len());
        assert!(config.sources.iter().all(|s| s.enabled));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let config = Config::from_toml("[updates]\ninterval_hours = 9223372036854775807").unwrap();
        assert_eq!(config.updates.interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            port = 9000

            [[sources]]
            url = "https://lists.example/a.txt"
            name = "A"

            [[sources]]
            url = "https://lists.example/b.txt"
            name = "B"
            enabled = false

            [updates]
            keep_stale_categories = false
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].enabled);
        assert!(!config.sources[1].enabled);
        assert_eq!(config.updates.concurrent_downloads, 4);
        assert_eq!(config.updates.replace_policy(), ReplacePolicy::Overwrite);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_initial_sources_dedup_by_url() {
        let config = Config::from_toml(
            r#"
            [[sources]]
            url = "https://lists.example/a.txt"
            name = "First"

            [[sources]]
            url = "https://lists.example/a.txt"
            name = "Second"
            "#,
        )
        .unwrap();

        let sources = config.initial_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Second");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml("port = \"not a number\"").is_err());
    }
}
