//! Connection settings for one remote portal and their persisted form.
//!
//! The connection list is persisted as a single comma-delimited string of
//! `endpoint#appId` pairs.

use url::Url;

/// Portal used when a connection does not name one.
pub const DEFAULT_PORTAL: &str = "https://maps.arcgis.com";
/// Relative REST path appended to every portal endpoint.
pub const DEFAULT_REST_PATH: &str = "sharing/rest";
/// Public OAuth application id used when a connection does not name one.
pub const DEFAULT_APP_ID: &str = "JYBrPM46vyNVTozY";
/// First record index of portal search paging (1-based).
pub const DEFAULT_PAGE_START: u32 = 1;
/// Number of records requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const LIST_SEPARATOR: char = ',';
const PAIR_SEPARATOR: char = '#';
const MISSING_APP_ID: &str = "undefined";

/// Paging parameters applied to every search a connection issues.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PagingDefaults {
    /// 1-based index of the first record.
    pub start: u32,
    /// Records requested per page.
    pub page_size: u32,
}

impl Default for PagingDefaults {
    fn default() -> Self {
        Self {
            start: DEFAULT_PAGE_START,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Static settings of one remote organization.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionConfig {
    /// Portal base URL, for example `https://maps.arcgis.com`.
    pub endpoint: String,
    /// OAuth application id used to sign in.
    pub app_id: String,
    /// REST path relative to `endpoint`.
    pub rest_path: String,
    pub paging: PagingDefaults,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORTAL)
    }
}

impl ConnectionConfig {
    /// Creates settings for `endpoint` with the default app id and paging.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_id: DEFAULT_APP_ID.to_string(),
            rest_path: DEFAULT_REST_PATH.to_string(),
            paging: PagingDefaults::default(),
        }
    }

    /// Replaces the OAuth application id.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();

        self
    }

    /// Replaces the search page size. Zero is clamped to one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.paging.page_size = page_size.max(1);

        self
    }

    /// Returns the host part of the endpoint, used as the top-level virtual
    /// directory for files opened from this portal.
    pub fn portal_name(&self) -> String {
        if let Ok(url) = Url::parse(&self.endpoint)
            && let Some(host) = url.host_str()
        {
            return match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
        }

        strip_scheme(&self.endpoint)
            .trim_start_matches(['/', ':'])
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Returns the absolute REST root, `endpoint/restPath`.
    pub fn rest_url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.rest_path.trim_matches('/')
        )
    }

    /// Returns the persisted `endpoint#appId` form.
    pub fn to_setting(&self) -> String {
        format!("{}{PAIR_SEPARATOR}{}", self.endpoint, self.app_id)
    }

    /// Parses one persisted `endpoint#appId` pair.
    ///
    /// Returns `None` when the endpoint part is empty.
    pub fn from_setting(pair: &str) -> Option<Self> {
        let pair = clean_setting(pair);
        let (endpoint, app_id) = match pair.split_once(PAIR_SEPARATOR) {
            Some((endpoint, app_id)) => (endpoint.trim(), app_id.trim()),
            None => (pair, ""),
        };
        if endpoint.is_empty() {
            return None;
        }

        let config = Self::new(endpoint);
        if app_id.is_empty() || app_id == MISSING_APP_ID {
            return Some(config);
        }

        Some(config.with_app_id(app_id))
    }
}

/// Parses the persisted connection list.
///
/// Blank and malformed entries are skipped.
pub fn parse_connection_list(setting: &str) -> Vec<ConnectionConfig> {
    let setting = clean_setting(setting);
    if setting.is_empty() {
        return Vec::new();
    }

    setting
        .split(LIST_SEPARATOR)
        .filter_map(ConnectionConfig::from_setting)
        .collect()
}

/// Formats connections into the persisted list form.
pub fn format_connection_list(configs: &[ConnectionConfig]) -> String {
    configs
        .iter()
        .map(ConnectionConfig::to_setting)
        .collect::<Vec<_>>()
        .join(&LIST_SEPARATOR.to_string())
}

/// Normalizes a user-entered portal address into an `https://` endpoint.
///
/// Accepts bare hosts (`org.maps.arcgis.com`), web-adaptor paths
/// (`host/portal`) and full REST URLs; the scheme and any trailing
/// `sharing/rest` segment are replaced. Returns `None` when nothing usable
/// remains.
pub fn normalize_endpoint(input: &str) -> Option<String> {
    let mut address = strip_scheme(input.trim()).trim_matches('/');
    for suffix in ["sharing/rest", "rest/sharing"] {
        if let Some(stripped) = address.strip_suffix(suffix) {
            address = stripped.trim_end_matches('/');
        }
    }
    if address.is_empty() {
        return None;
    }

    let endpoint = format!("https://{address}");
    Url::parse(&endpoint).ok()?;

    Some(endpoint)
}

fn strip_scheme(address: &str) -> &str {
    address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .unwrap_or(address)
}

/// Removes surrounding whitespace and quotes left by older settings writers.
fn clean_setting(value: &str) -> &str {
    value.trim().trim_matches(['"', '\'']).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_name_strips_scheme_and_path() {
        // Arrange
        let config = ConnectionConfig::new("https://gis.example.com/portal");

        // Act
        let portal_name = config.portal_name();

        // Assert
        assert_eq!(portal_name, "gis.example.com");
    }

    #[test]
    fn test_portal_name_keeps_explicit_port() {
        // Arrange
        let config = ConnectionConfig::new("https://gis.example.com:7443/portal");

        // Act
        let portal_name = config.portal_name();

        // Assert
        assert_eq!(portal_name, "gis.example.com:7443");
    }

    #[test]
    fn test_rest_url_joins_endpoint_and_rest_path() {
        // Arrange
        let config = ConnectionConfig::new("https://maps.arcgis.com/");

        // Act
        let rest_url = config.rest_url();

        // Assert
        assert_eq!(rest_url, "https://maps.arcgis.com/sharing/rest");
    }

    #[test]
    fn test_parse_connection_list_reads_endpoint_app_id_pairs() {
        // Arrange
        let setting = "\"https://a.example.com#app-a,https://b.example.com#undefined\"";

        // Act
        let configs = parse_connection_list(setting);

        // Assert
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].endpoint, "https://a.example.com");
        assert_eq!(configs[0].app_id, "app-a");
        assert_eq!(configs[1].app_id, DEFAULT_APP_ID);
    }

    #[test]
    fn test_parse_connection_list_skips_blank_entries() {
        // Arrange
        let setting = " ,#app, https://a.example.com ";

        // Act
        let configs = parse_connection_list(setting);

        // Assert
        assert_eq!(configs, vec![ConnectionConfig::new("https://a.example.com")]);
    }

    #[test]
    fn test_format_connection_list_is_read_back_by_parser() {
        // Arrange
        let configs = vec![
            ConnectionConfig::new("https://a.example.com").with_app_id("one"),
            ConnectionConfig::new("https://b.example.com/portal"),
        ];

        // Act
        let setting = format_connection_list(&configs);

        // Assert
        assert_eq!(
            setting,
            format!("https://a.example.com#one,https://b.example.com/portal#{DEFAULT_APP_ID}")
        );
        assert_eq!(parse_connection_list(&setting), configs);
    }

    #[test]
    fn test_normalize_endpoint_replaces_scheme_and_rest_suffix() {
        // Arrange
        let input = "http://org.maps.arcgis.com/sharing/rest/";

        // Act
        let endpoint = normalize_endpoint(input);

        // Assert
        assert_eq!(endpoint.as_deref(), Some("https://org.maps.arcgis.com"));
    }

    #[test]
    fn test_normalize_endpoint_keeps_web_adaptor_path() {
        // Arrange
        let input = "webadaptor.example.com/portal";

        // Act
        let endpoint = normalize_endpoint(input);

        // Assert
        assert_eq!(
            endpoint.as_deref(),
            Some("https://webadaptor.example.com/portal")
        );
    }

    #[test]
    fn test_normalize_endpoint_rejects_empty_input() {
        // Arrange
        let input = "https:// ";

        // Act
        let endpoint = normalize_endpoint(input);

        // Assert
        assert_eq!(endpoint, None);
    }

    #[test]
    fn test_with_page_size_clamps_zero() {
        // Arrange
        let config = ConnectionConfig::default();

        // Act
        let config = config.with_page_size(0);

        // Assert
        assert_eq!(config.paging.page_size, 1);
    }
}
