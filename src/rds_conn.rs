use redis::aio::MultiplexedConnection;
use redis::RedisResult;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use std::ops::{Deref, DerefMut};

pub struct RdsConn(pub MultiplexedConnection);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RdsConn {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.rocket().state::<MultiplexedConnection>() {
            Some(rconn) => Outcome::Success(RdsConn(rconn.clone())),
            None => Outcome::Failure((Status::InternalServerError, ())),
        }
    }
}

impl Clone for RdsConn {
    fn clone(&self) -> Self {
        RdsConn(self.0.clone())
    }
}

impl Deref for RdsConn {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RdsConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub async fn init_rds_client(redis_url: &str) -> RedisResult<MultiplexedConnection> {
    let client = redis::Client::open(redis_url)?;
    client.get_multiplexed_async_connection().await
}
