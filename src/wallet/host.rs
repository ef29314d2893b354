//! Wallet discovery in the embedding environment
//!
//! Desktop hosts either inject a provider or have none. Mobile browsers never
//! inject one, so the user is sent to the wallet app through a deep link and,
//! if the app does not take over, to the store listing for their OS.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info};

use super::WalletProvider;
use crate::config::WalletConfig;

/// The environment the client runs in
pub trait HostEnvironment: Send + Sync {
    /// Provider exposed by the environment, if any
    fn injected_provider(&self) -> Option<Arc<dyn WalletProvider>>;

    fn user_agent(&self) -> Option<String>;

    /// Host name of the running dapp, used to build the deep link
    fn dapp_host(&self) -> Option<String>;

    /// Navigate to an external URL
    fn open_url(&self, url: &str);

    /// Whether the environment still has focus (the wallet app did not open)
    fn is_foreground(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobilePlatform {
    Ios,
    Android,
}

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)iphone|ipad|ipod|android").expect("mobile user agent pattern is valid")
    })
}

impl MobilePlatform {
    /// Detect a touch platform from a user agent string
    pub fn from_user_agent(user_agent: &str) -> Option<Self> {
        let found = mobile_pattern().find(user_agent)?;
        if found.as_str().eq_ignore_ascii_case("android") {
            Some(MobilePlatform::Android)
        } else {
            Some(MobilePlatform::Ios)
        }
    }

    pub fn store_url<'a>(&self, config: &'a WalletConfig) -> &'a str {
        match self {
            MobilePlatform::Ios => &config.ios_store_url,
            MobilePlatform::Android => &config.android_store_url,
        }
    }
}

/// Outcome of provider detection
#[derive(Clone)]
pub enum Detection {
    Injected(Arc<dyn WalletProvider>),
    /// The wallet app was opened through its deep link
    RedirectedToWallet,
    /// The wallet app did not open; the store listing was opened instead
    RedirectedToStore(MobilePlatform),
    /// Desktop without a provider
    NotFound,
}

impl Detection {
    pub fn provider(&self) -> Option<Arc<dyn WalletProvider>> {
        match self {
            Detection::Injected(provider) => Some(provider.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Detection::Injected(provider) => write!(f, "Injected({})", provider.name()),
            Detection::RedirectedToWallet => write!(f, "RedirectedToWallet"),
            Detection::RedirectedToStore(platform) => write!(f, "RedirectedToStore({:?})", platform),
            Detection::NotFound => write!(f, "NotFound"),
        }
    }
}

/// Deep link opening the dapp inside the wallet's browser
pub fn deep_link(host: &dyn HostEnvironment, config: &WalletConfig) -> String {
    let dapp_host = host
        .dapp_host()
        .or_else(|| config.dapp_host.clone())
        .unwrap_or_default();
    format!("{}{}", config.deep_link_base, dapp_host)
}

/// Find a wallet provider, redirecting mobile users to the wallet app
pub async fn detect_provider(host: &dyn HostEnvironment, config: &WalletConfig) -> Detection {
    if let Some(provider) = host.injected_provider() {
        debug!("Found injected wallet provider: {}", provider.name());
        return Detection::Injected(provider);
    }

    let platform = host
        .user_agent()
        .as_deref()
        .and_then(MobilePlatform::from_user_agent);

    let Some(platform) = platform else {
        debug!("No wallet provider on desktop host");
        return Detection::NotFound;
    };

    let link = deep_link(host, config);
    info!("Opening wallet deep link on {:?}: {}", platform, link);
    host.open_url(&link);

    tokio::time::sleep(config.store_redirect_delay()).await;

    if host.is_foreground() {
        let store = platform.store_url(config);
        info!("Wallet app did not open, redirecting to {}", store);
        host.open_url(store);
        Detection::RedirectedToStore(platform)
    } else {
        Detection::RedirectedToWallet
    }
}

/// Host for terminal use: the provider is supplied up front, URLs are logged
pub struct LocalHost {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl LocalHost {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { provider }
    }
}

impl HostEnvironment for LocalHost {
    fn injected_provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.clone()
    }

    fn user_agent(&self) -> Option<String> {
        None
    }

    fn dapp_host(&self) -> Option<String> {
        None
    }

    fn open_url(&self, url: &str) {
        info!("Open in a browser: {}", url);
    }

    fn is_foreground(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36";
        let desktop = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";

        assert_eq!(MobilePlatform::from_user_agent(iphone), Some(MobilePlatform::Ios));
        assert_eq!(MobilePlatform::from_user_agent("ipad safari"), Some(MobilePlatform::Ios));
        assert_eq!(MobilePlatform::from_user_agent(android), Some(MobilePlatform::Android));
        assert_eq!(MobilePlatform::from_user_agent(desktop), None);
    }

    #[test]
    fn test_store_urls() {
        let config = WalletConfig::default();
        assert!(MobilePlatform::Ios.store_url(&config).contains("apps.apple.com"));
        assert!(MobilePlatform::Android.store_url(&config).contains("play.google.com"));
    }

    #[tokio::test]
    async fn test_local_host_without_provider() {
        let host = LocalHost::new(None);
        let detection = detect_provider(&host, &WalletConfig::default()).await;
        assert!(matches!(detection, Detection::NotFound));
        assert!(detection.provider().is_none());
    }

    #[test]
    fn test_deep_link_uses_config_host() {
        let config = WalletConfig {
            dapp_host: Some("presale.example.org".to_string()),
            ..WalletConfig::default()
        };
        assert_eq!(
            deep_link(&LocalHost::new(None), &config),
            "https://metamask.app.link/dapp/presale.example.org"
        );
    }
}
