use rocket::serde::{Deserialize, Serialize};

/// `[default.site]` in Rocket.toml, or `ROCKET_SITE={...}`.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(crate = "rocket::serde", default)]
pub struct SiteConfig {
    /// (key, display name)
    pub tabs: Vec<(String, String)>,
    pub grades: Vec<(String, String)>,
    pub upload_dir: String,
    pub upload_url_prefix: String,
    pub no_reply_cache_secs: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let pairs = |xs: &[(&str, &str)]| {
            xs.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        SiteConfig {
            tabs: pairs(&[("share", "分享"), ("ask", "问答"), ("job", "招聘")]),
            grades: pairs(&[("A", "A"), ("B", "B"), ("C", "C")]),
            upload_dir: "upload".to_string(),
            upload_url_prefix: "/upload".to_string(),
            no_reply_cache_secs: 60,
        }
    }
}

impl SiteConfig {
    pub fn has_tab(&self, tab: &str) -> bool {
        self.tabs.iter().any(|(k, _)| k == tab)
    }
}
