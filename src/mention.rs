use crate::db_conn::Db;
use crate::models::{NewMessage, User};
use log::info;
use regex::{Captures, Regex};
use std::sync::OnceLock;

type MR<T> = Result<T, diesel::result::Error>;

fn ignore_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"```.+?```",               // 单行 ```
            r"(?ms)^```.+?^```",        // 代码块
            r"(?s)`.+?`",               // 行内代码
            r"(?m)^    .*",             // 缩进代码
            r"\b\S*?@[^\s]*?\..+?\b",   // email
            r"\[@.+?\]\(/.+?\)",        // 已经链接过的
        ]
        .iter()
        .map(|re| Regex::new(re).unwrap())
        .collect()
    })
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9_-]+)").unwrap())
}

/// Login names mentioned in `text`, first appearance order, no duplicates.
pub fn fetch_users(text: &str) -> Vec<String> {
    let mut stripped = text.to_string();
    for re in ignore_regexes() {
        stripped = re.replace_all(&stripped, "").into_owned();
    }
    let mut names: Vec<String> = vec![];
    for caps in mention_regex().captures_iter(&stripped) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// `@name` -> `[@name](/user/name)` for every real mention.
pub fn link_users(text: &str) -> String {
    let names = fetch_users(text);
    if names.is_empty() {
        return text.to_string();
    }
    mention_regex()
        .replace_all(text, |caps: &Captures| {
            let whole = caps.get(0).unwrap();
            let name = &caps[1];
            let already_linked = text[whole.end()..].starts_with(']');
            if already_linked || !names.iter().any(|n| n == name) {
                whole.as_str().to_string()
            } else {
                format!("[@{0}](/user/{0})", name)
            }
        })
        .into_owned()
}

/// Notify everyone mentioned in `text` except the author.
pub async fn send_message_to_mention_users(
    db: &Db,
    text: &str,
    order_id: &str,
    reply_id: Option<&str>,
    author_id: &str,
) -> MR<usize> {
    let users = User::gets_by_names(db, fetch_users(text)).await?;
    let msgs = users
        .iter()
        .filter(|u| u.id != author_id)
        .map(|u| NewMessage::at(&u.id, author_id, order_id, reply_id))
        .collect::<Vec<NewMessage>>();
    let n = NewMessage::create_many(db, msgs).await?;
    if n > 0 {
        info!("sent {} mention messages for order {}", n, order_id);
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_simple() {
        assert_eq!(
            fetch_users("hi @alice and @bob-2, again @alice"),
            vec!["alice", "bob-2"]
        );
    }

    #[test]
    fn fetch_skips_code_and_email() {
        let text = "mail me a@b.com\n`@inline`\n```\n@fenced\n```\n    @indented\nreal @carol";
        assert_eq!(fetch_users(text), vec!["carol"]);
    }

    #[test]
    fn fetch_skips_linked() {
        assert!(fetch_users("[@dave](/user/dave)").is_empty());
    }

    #[test]
    fn link() {
        assert_eq!(
            link_users("ping @alice, thanks"),
            "ping [@alice](/user/alice), thanks"
        );
    }

    #[test]
    fn link_leaves_code_alone() {
        assert_eq!(link_users("`@alice` only"), "`@alice` only");
    }

    #[test]
    fn link_is_idempotent() {
        let once = link_users("@alice @bob");
        assert_eq!(link_users(&once), once);
    }
}
