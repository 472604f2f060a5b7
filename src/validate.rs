use crate::config::SiteConfig;

pub const TITLE_MIN: usize = 5;
pub const TITLE_MAX: usize = 100;

/// HTML-escape the characters that matter in markup and attributes, backtick and backslash included.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#96;"),
            '\\' => out.push_str("&#x5C;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub title: String,
    pub tab: String,
    pub content: String,
}

impl OrderDraft {
    /// trim + escape title and tab, trim content
    pub fn clean(title: &str, tab: &str, content: &str) -> Self {
        OrderDraft {
            title: escape(title.trim()),
            tab: escape(tab.trim()),
            content: content.trim().to_string(),
        }
    }

    pub fn check(&self, site: &SiteConfig) -> Result<(), &'static str> {
        let title_len = self.title.chars().count();
        if self.title.is_empty() {
            Err("标题不能是空的。")
        } else if !(TITLE_MIN..=TITLE_MAX).contains(&title_len) {
            Err("标题字数太多或太少。")
        } else if self.tab.is_empty() || !site.has_tab(&self.tab) {
            Err("必须选择一个版块。")
        } else if self.content.is_empty() {
            Err("内容不可为空")
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, tab: &str, content: &str) -> OrderDraft {
        OrderDraft::clean(title, tab, content)
    }

    fn check(d: &OrderDraft) -> Result<(), &'static str> {
        d.check(&SiteConfig::default())
    }

    #[test]
    fn empty_title() {
        assert_eq!(check(&draft("   ", "share", "x")), Err("标题不能是空的。"));
    }

    #[test]
    fn title_length_bounds() {
        assert_eq!(check(&draft("abcd", "share", "x")), Err("标题字数太多或太少。"));
        assert_eq!(
            check(&draft(&"a".repeat(101), "share", "x")),
            Err("标题字数太多或太少。")
        );
        assert_eq!(check(&draft("abcde", "share", "x")), Ok(()));
        assert_eq!(check(&draft(&"a".repeat(100), "share", "x")), Ok(()));
    }

    #[test]
    fn title_counts_chars_not_bytes() {
        assert_eq!(check(&draft("五个汉字啊", "ask", "x")), Ok(()));
    }

    #[test]
    fn title_checked_after_escape() {
        // "<<" becomes "&lt;&lt;", long enough
        assert_eq!(check(&draft("<<", "share", "x")), Ok(()));
    }

    #[test]
    fn unknown_tab() {
        assert_eq!(check(&draft("hello world", "", "x")), Err("必须选择一个版块。"));
        assert_eq!(check(&draft("hello world", "dev", "x")), Err("必须选择一个版块。"));
    }

    #[test]
    fn empty_content() {
        assert_eq!(check(&draft("hello world", "job", "  \n ")), Err("内容不可为空"));
    }

    #[test]
    fn clean_trims_and_escapes() {
        let d = draft("  <b>hi</b> ", " ask ", "  body\n");
        assert_eq!(d.title, "&lt;b&gt;hi&lt;&#x2F;b&gt;");
        assert_eq!(d.tab, "ask");
        assert_eq!(d.content, "body");
    }

    #[test]
    fn escape_quotes() {
        assert_eq!(escape(r#"a"b'c`&"#), "a&quot;b&#x27;c&#96;&amp;");
        assert_eq!(escape(r"C:\tmp"), "C:&#x5C;tmp");
    }
}
