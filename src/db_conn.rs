use rocket_sync_db_pools::{database, diesel};

pub type Conn = diesel::PgConnection;

#[database("main_db")]
pub struct Db(Conn);
