use crate::models::{OrderItem, User};
use crate::rds_conn::RdsConn;
use log::warn;
use redis::AsyncCommands;
use rocket::serde::json::serde_json;

const USER_EXPIRE_TIME: usize = 60 * 60;

const KEY_NO_REPLY_ORDERS: &str = "orderclub:cache:no_reply_orders";

/// Short-lived list shown beside every order page.
pub struct NoReplyOrdersCache {
    rconn: RdsConn,
    ttl: usize,
}

impl NoReplyOrdersCache {
    pub fn init(rconn: &RdsConn, ttl: usize) -> Self {
        NoReplyOrdersCache {
            rconn: rconn.clone(),
            ttl,
        }
    }

    pub async fn set(&mut self, items: &Vec<OrderItem>) {
        let s = match serde_json::to_string(items) {
            Ok(s) => s,
            Err(e) => {
                warn!("encode no reply orders failed: {}", e);
                return;
            }
        };
        self.rconn
            .set_ex(KEY_NO_REPLY_ORDERS, s, self.ttl)
            .await
            .unwrap_or_else(|e| {
                warn!("set no reply orders cache failed: {}", e);
            })
    }

    pub async fn get(&mut self) -> Option<Vec<OrderItem>> {
        let rds_result: Option<String> = self
            .rconn
            .get::<&str, Option<String>>(KEY_NO_REPLY_ORDERS)
            .await
            .unwrap_or_else(|e| {
                warn!("try to get no reply orders cache, connect rds fail, {}", e);
                None
            });

        rds_result.and_then(|s| {
            serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("get no reply orders cache, decode failed {}, {}", e, s);
                None
            })
        })
    }
}

pub struct UserCache {
    key: String,
    rconn: RdsConn,
}

impl UserCache {
    pub fn init(token: &str, rconn: &RdsConn) -> Self {
        UserCache {
            key: format!("orderclub:cache:user:{}", token),
            rconn: rconn.clone(),
        }
    }

    pub async fn set(&mut self, u: &User) {
        let s = match serde_json::to_string(u) {
            Ok(s) => s,
            Err(e) => {
                warn!("encode user failed: {}", e);
                return;
            }
        };
        self.rconn
            .set_ex(&self.key, s, USER_EXPIRE_TIME)
            .await
            .unwrap_or_else(|e| {
                warn!("set user cache failed: {}", e);
            })
    }

    pub async fn get(&mut self) -> Option<User> {
        let rds_result = self.rconn.get::<&String, String>(&self.key).await;
        if let Ok(s) = rds_result {
            self.rconn
                .expire::<&String, bool>(&self.key, USER_EXPIRE_TIME)
                .await
                .unwrap_or_else(|e| {
                    warn!(
                        "get user cache, set new expire failed: {}, {}, {} ",
                        e, &self.key, &s
                    );
                    false
                });
            serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("get user cache, decode failed {}, {}", e, s);
                None
            })
        } else {
            None
        }
    }
}
