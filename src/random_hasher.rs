use chrono::offset::Local;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sha2::{Digest, Sha256};

pub const OBJECT_ID_LEN: usize = 24;

/// 8 hex chars of unix seconds followed by 16 hex chars of randomness.
pub fn new_object_id() -> String {
    let random: u64 = thread_rng().gen();
    format!("{:08x}{:016x}", Local::now().timestamp() as u32, random)
}

pub fn is_object_id(id: &str) -> bool {
    id.len() == OBJECT_ID_LEN
}

pub struct RandomHasher {
    pub salt: String,
}

impl RandomHasher {
    pub fn get_random_one() -> RandomHasher {
        RandomHasher {
            salt: thread_rng()
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect(),
        }
    }

    pub fn hash_with_salt(&self, text: &str) -> String {
        let mut h = Sha256::new();
        h.update(text);
        h.update(&self.salt);
        format!("{:x}", h.finalize())[..32].to_string()
    }

    // 上传文件名：原文件名 + 时间戳 加盐哈希，保留扩展名
    pub fn upload_name(&self, filename: &str, ext: &str) -> String {
        let stamp = Local::now().timestamp_nanos();
        format!(
            "{}.{}",
            self.hash_with_salt(&format!("{}_{}", filename, stamp)),
            ext
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_is_24_hex() {
        let id = new_object_id();
        assert_eq!(id.len(), OBJECT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(is_object_id(&id));
    }

    #[test]
    fn object_ids_differ() {
        assert_ne!(new_object_id(), new_object_id());
    }

    #[test]
    fn malformed_ids() {
        assert!(!is_object_id(""));
        assert!(!is_object_id("123"));
        assert!(!is_object_id(&"a".repeat(25)));
    }

    #[test]
    fn upload_name_keeps_extension() {
        let rh = RandomHasher::get_random_one();
        let name = rh.upload_name("cat.png", "png");
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 32 + 4);
    }
}
