#![allow(clippy::all)]

use crate::db_conn::{Conn, Db};
use crate::mention;
use crate::random_hasher::new_object_id;
use crate::schema::*;
use crate::validate::OrderDraft;
use chrono::{offset::Utc, DateTime};
use diesel::pg::Pg;
use diesel::query_builder::QueryFragment;
use diesel::query_dsl::methods::ExecuteDsl;
use diesel::sql_types::Text;
use diesel::{insert_into, ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use rocket::futures::{future, try_join};
use rocket::serde::{Deserialize, Serialize};

type MR<T> = Result<T, diesel::result::Error>;

pub const SITEMAP_LIMIT: i64 = 50000;

macro_rules! get {
    ($table:ident) => {
        pub async fn get(db: &Db, id: &str) -> MR<Option<Self>> {
            let id = id.to_string();
            db.run(move |c| $table::table.find(id).first::<Self>(c).optional())
                .await
        }
    };
}

macro_rules! set_deleted {
    ($table:ident) => {
        pub async fn set_deleted(&mut self, db: &Db) -> MR<()> {
            let id = self.id.clone();
            db.run(move |c| {
                diesel::update($table::table.find(id))
                    .set($table::deleted.eq(true))
                    .execute(c)
            })
            .await?;
            self.deleted = true;
            Ok(())
        }
    };
}

macro_rules! toggle {
    ($fname:ident, $col:ident) => {
        pub async fn $fname(&mut self, db: &Db) -> MR<bool> {
            let id = self.id.clone();
            let v = !self.$col;
            db.run(move |c| {
                diesel::update(orders::table.find(id))
                    .set(orders::$col.eq(v))
                    .execute(c)
            })
            .await?;
            self.$col = v;
            Ok(v)
        }
    };
}

macro_rules! change_user_counter {
    ($fname:ident, $col:ident) => {
        pub async fn $fname(db: &Db, id: &str, delta: i32) -> MR<Self> {
            let id = id.to_string();
            db.run(move |c| {
                diesel::update(users::table.find(id))
                    .set(users::$col.eq(users::$col + delta))
                    .get_result(c)
            })
            .await
        }
    };
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct Order {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tab: String,
    pub author_id: String,
    pub reply_count: i32,
    pub visit_count: i32,
    pub collect_count: i32,
    pub last_reply: Option<String>,
    pub last_reply_at: DateTime<Utc>,
    pub top: bool,
    pub good: bool,
    pub lock: bool,
    pub deleted: bool,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "orders"]
pub struct NewOrder {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tab: String,
    pub author_id: String,
}

/// An order in a list, with its author and last reply resolved.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct OrderItem {
    pub order: Order,
    pub author: User,
    pub reply: Option<Reply>,
}

#[derive(Serialize, Debug)]
#[serde(crate = "rocket::serde")]
pub struct FullOrder {
    pub order: Order,
    pub linked_content: String,
    pub author: User,
}

#[derive(Default, Debug, Clone)]
pub struct OrderQuery {
    pub author_id: Option<String>,
    pub exclude_ids: Vec<String>,
    pub reply_count: Option<i32>,
    pub tab: Option<String>,
    pub tab_ne: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum OrderSort {
    LastReplyAtDesc,
    CreateAtDesc,
    TopThenLastReply,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub limit: i64,
    pub offset: i64,
    pub sort: OrderSort,
}

impl QueryOptions {
    pub fn new(limit: i64, sort: OrderSort) -> Self {
        QueryOptions {
            limit,
            offset: 0,
            sort,
        }
    }
}

impl OrderQuery {
    // 已删除的永远不出现
    fn boxed(&self) -> orders::BoxedQuery<'static, Pg> {
        let mut query = orders::table.into_boxed();
        query = query.filter(orders::deleted.eq(false));
        if let Some(author_id) = &self.author_id {
            query = query.filter(orders::author_id.eq(author_id.clone()));
        }
        if !self.exclude_ids.is_empty() {
            query = query.filter(orders::id.ne_all(self.exclude_ids.clone()));
        }
        if let Some(n) = self.reply_count {
            query = query.filter(orders::reply_count.eq(n));
        }
        if let Some(tab) = &self.tab {
            query = query.filter(orders::tab.eq(tab.clone()));
        }
        if let Some(tab) = &self.tab_ne {
            query = query.filter(orders::tab.ne(tab.clone()));
        }
        query
    }

    fn with_options(&self, opt: QueryOptions) -> orders::BoxedQuery<'static, Pg> {
        let query = self.boxed();
        let query = match opt.sort {
            OrderSort::LastReplyAtDesc => query.order(orders::last_reply_at.desc()),
            OrderSort::CreateAtDesc => query.order(orders::create_at.desc()),
            OrderSort::TopThenLastReply => {
                query.order((orders::top.desc(), orders::last_reply_at.desc()))
            }
        };
        query.offset(opt.offset).limit(opt.limit)
    }
}

/// Pair each order with its looked-up author and last reply, dropping orders
/// whose author is gone. Relative order is kept.
pub fn attach_authors(
    orders: Vec<Order>,
    joined: Vec<(Option<User>, Option<Reply>)>,
) -> Vec<OrderItem> {
    orders
        .into_iter()
        .zip(joined)
        .filter_map(|(order, (author, reply))| {
            author.map(|author| OrderItem {
                order,
                author,
                reply,
            })
        })
        .collect()
}

impl Order {
    get!(orders);

    set_deleted!(orders);

    toggle!(toggle_top, top);

    toggle!(toggle_good, good);

    toggle!(toggle_lock, lock);

    pub async fn create(db: &Db, draft: OrderDraft, author_id: &str) -> MR<Self> {
        let new_order = NewOrder {
            id: new_object_id(),
            title: draft.title,
            content: draft.content,
            tab: draft.tab,
            author_id: author_id.to_string(),
        };
        db.run(move |c| insert_into(orders::table).values(&new_order).get_result(c))
            .await
    }

    pub async fn list_by_query(
        db: &Db,
        query: OrderQuery,
        opt: QueryOptions,
    ) -> MR<Vec<OrderItem>> {
        let orders: Vec<Order> = db
            .run(move |c| query.with_options(opt).load(c))
            .await?;
        if orders.is_empty() {
            return Ok(vec![]);
        }

        let joined = future::try_join_all(orders.iter().map(|o| async move {
            try_join!(
                User::get(db, &o.author_id),
                Reply::get_opt(db, o.last_reply.as_deref())
            )
        }))
        .await?;

        Ok(attach_authors(orders, joined))
    }

    pub async fn count_by_query(db: &Db, query: OrderQuery) -> MR<i64> {
        db.run(move |c| query.boxed().count().get_result(c)).await
    }

    // for sitemap
    pub async fn recent_ids(db: &Db) -> MR<Vec<String>> {
        db.run(|c| {
            orders::table
                .filter(orders::deleted.eq(false))
                .select(orders::id)
                .order(orders::create_at.desc())
                .limit(SITEMAP_LIMIT)
                .load(c)
        })
        .await
    }

    /// None if the order or its author is missing.
    pub async fn get_with_author(db: &Db, id: &str) -> MR<Option<(Order, User, Option<Reply>)>> {
        let order = match Self::get(db, id).await? {
            Some(o) => o,
            None => return Ok(None),
        };
        let (author, last_reply) = try_join!(
            User::get(db, &order.author_id),
            Reply::get_opt(db, order.last_reply.as_deref())
        )?;
        Ok(author.map(|a| (order, a, last_reply)))
    }

    /// Inner `Err` carries the message shown to the visitor.
    pub async fn get_full(db: &Db, id: &str) -> MR<Result<FullOrder, &'static str>> {
        let order = match Self::get(db, id).await? {
            Some(o) if !o.deleted => o,
            _ => return Ok(Err("此话题不存在或已被删除。")),
        };
        let (linked_content, author) = try_join!(
            async { Ok::<_, diesel::result::Error>(mention::link_users(&order.content)) },
            User::get(db, &order.author_id)
        )?;
        Ok(match author {
            Some(author) => Ok(FullOrder {
                order,
                linked_content,
                author,
            }),
            None => Err("话题的作者丢了。"),
        })
    }

    pub async fn incr_visit(&mut self, db: &Db) -> MR<()> {
        let id = self.id.clone();
        db.run(move |c| {
            diesel::update(orders::table.find(id))
                .set(orders::visit_count.eq(orders::visit_count + 1))
                .execute(c)
        })
        .await?;
        self.visit_count += 1;
        Ok(())
    }

    pub async fn update_content(&mut self, db: &Db, draft: OrderDraft) -> MR<()> {
        let id = self.id.clone();
        let now = Utc::now();
        let (title, content, tab) = (draft.title.clone(), draft.content.clone(), draft.tab.clone());
        db.run(move |c| {
            diesel::update(orders::table.find(id))
                .set((
                    orders::title.eq(title),
                    orders::content.eq(content),
                    orders::tab.eq(tab),
                    orders::update_at.eq(now),
                ))
                .execute(c)
        })
        .await?;
        self.title = draft.title;
        self.content = draft.content;
        self.tab = draft.tab;
        self.update_at = now;
        Ok(())
    }

    pub async fn change_collect_count(&mut self, db: &Db, delta: i32) -> MR<()> {
        let id = self.id.clone();
        db.run(move |c| {
            diesel::update(orders::table.find(id))
                .set(orders::collect_count.eq(orders::collect_count + delta))
                .execute(c)
        })
        .await?;
        self.collect_count += delta;
        Ok(())
    }

    pub async fn update_last_reply(db: &Db, order_id: &str, reply_id: &str) -> MR<usize> {
        let (oid, rid) = (order_id.to_string(), reply_id.to_string());
        db.run(move |c| {
            diesel::update(orders::table.find(oid))
                .set((
                    orders::last_reply.eq(Some(rid)),
                    orders::last_reply_at.eq(Utc::now()),
                    orders::reply_count.eq(orders::reply_count + 1),
                ))
                .execute(c)
        })
        .await
    }

    /// Called after a reply is removed. A missing order gives `NotFound`.
    pub async fn reduce_count(db: &Db, id: &str) -> MR<Order> {
        let oid = id.to_string();
        db.run(move |c| {
            let order: Order = orders::table.find(&oid).first(c)?;
            let last_reply: Option<String> =
                Reply::newest_live_query(&oid).first(c).optional()?;
            diesel::update(&order)
                .set((
                    orders::reply_count.eq(orders::reply_count - 1),
                    orders::last_reply.eq(last_reply),
                ))
                .get_result(c)
        })
        .await
    }
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct User {
    pub id: String,
    pub loginname: String,
    #[serde(skip)]
    pub token: String,
    pub score: i32,
    pub order_count: i32,
    pub reply_count: i32,
    pub collect_order_count: i32,
    pub is_admin: bool,
}

impl User {
    get!(users);

    change_user_counter!(change_reply_count, reply_count);

    change_user_counter!(change_collect_count, collect_order_count);

    pub async fn get_by_token(db: &Db, token: &str) -> MR<Option<Self>> {
        let token = token.to_string();
        db.run(move |c| {
            users::table
                .filter(users::token.eq(token))
                .first(c)
                .optional()
        })
        .await
    }

    pub async fn gets_by_names(db: &Db, names: Vec<String>) -> MR<Vec<Self>> {
        if names.is_empty() {
            return Ok(vec![]);
        }
        db.run(move |c| {
            users::table
                .filter(users::loginname.eq_any(names))
                .load(c)
        })
        .await
    }

    // 发帖 +5 积分
    pub async fn award_order(db: &Db, id: &str) -> MR<Self> {
        let id = id.to_string();
        db.run(move |c| {
            diesel::update(users::table.find(id))
                .set((
                    users::score.eq(users::score + 5),
                    users::order_count.eq(users::order_count + 1),
                ))
                .get_result(c)
        })
        .await
    }
}

#[derive(Queryable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
#[table_name = "replies"]
pub struct Reply {
    pub id: String,
    pub order_id: String,
    pub author_id: String,
    pub content: String,
    pub deleted: bool,
    pub create_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "replies"]
pub struct NewReply {
    pub id: String,
    pub order_id: String,
    pub author_id: String,
    pub content: String,
}

#[derive(Serialize, Debug)]
#[serde(crate = "rocket::serde")]
pub struct ReplyItem {
    pub reply: Reply,
    pub linked_content: String,
    pub author: User,
}

impl Reply {
    get!(replies);

    set_deleted!(replies);

    /// Id of the newest reply not yet deleted.
    fn newest_live_query(order_id: &str) -> replies::BoxedQuery<'static, Pg, Text> {
        replies::table
            .select(replies::id)
            .filter(replies::order_id.eq(order_id.to_string()))
            .filter(replies::deleted.eq(false))
            .order(replies::create_at.desc())
            .into_boxed()
    }

    pub async fn get_opt(db: &Db, id: Option<&str>) -> MR<Option<Self>> {
        match id {
            Some(id) => Self::get(db, id).await,
            None => Ok(None),
        }
    }

    pub async fn create(db: &Db, order_id: &str, author_id: &str, content: String) -> MR<Self> {
        let new_reply = NewReply {
            id: new_object_id(),
            order_id: order_id.to_string(),
            author_id: author_id.to_string(),
            content,
        };
        db.run(move |c| insert_into(replies::table).values(&new_reply).get_result(c))
            .await
    }

    /// Live replies, oldest first, with authors. Replies by vanished users are skipped.
    pub async fn gets_by_order_id(db: &Db, order_id: &str) -> MR<Vec<ReplyItem>> {
        let oid = order_id.to_string();
        let rs: Vec<Reply> = db
            .run(move |c| {
                replies::table
                    .filter(replies::order_id.eq(oid))
                    .filter(replies::deleted.eq(false))
                    .order(replies::create_at.asc())
                    .load(c)
            })
            .await?;
        let authors =
            future::try_join_all(rs.iter().map(|r| User::get(db, &r.author_id))).await?;
        Ok(rs
            .into_iter()
            .zip(authors)
            .filter_map(|(reply, author)| {
                author.map(|author| ReplyItem {
                    linked_content: mention::link_users(&reply.content),
                    reply,
                    author,
                })
            })
            .collect())
    }
}

#[derive(Queryable, Identifiable, Debug)]
pub struct OrderCollect {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub create_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "order_collects"]
pub struct NewOrderCollect {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
}

impl NewOrderCollect {
    fn insert_query(&self) -> impl ExecuteDsl<Conn> + QueryFragment<Pg> + '_ {
        insert_into(order_collects::table)
            .values(self)
            .on_conflict_do_nothing()
    }
}

impl OrderCollect {
    pub async fn get(db: &Db, user_id: &str, order_id: &str) -> MR<Option<Self>> {
        let (uid, oid) = (user_id.to_string(), order_id.to_string());
        db.run(move |c| {
            order_collects::table
                .filter(order_collects::user_id.eq(uid))
                .filter(order_collects::order_id.eq(oid))
                .first(c)
                .optional()
        })
        .await
    }

    /// 1 when a new record went in, 0 when it was already there.
    pub async fn create(db: &Db, user_id: &str, order_id: &str) -> MR<usize> {
        let new_collect = NewOrderCollect {
            id: new_object_id(),
            user_id: user_id.to_string(),
            order_id: order_id.to_string(),
        };
        db.run(move |c| ExecuteDsl::execute(new_collect.insert_query(), c))
            .await
    }

    /// Number of removed records, 0 or 1.
    pub async fn remove(db: &Db, user_id: &str, order_id: &str) -> MR<usize> {
        let (uid, oid) = (user_id.to_string(), order_id.to_string());
        db.run(move |c| {
            diesel::delete(
                order_collects::table
                    .filter(order_collects::user_id.eq(uid))
                    .filter(order_collects::order_id.eq(oid)),
            )
            .execute(c)
        })
        .await
    }
}

#[derive(Insertable, Debug)]
#[table_name = "messages"]
pub struct NewMessage {
    pub id: String,
    pub kind: String,
    pub master_id: String,
    pub author_id: String,
    pub order_id: String,
    pub reply_id: Option<String>,
}

impl NewMessage {
    pub fn at(master_id: &str, author_id: &str, order_id: &str, reply_id: Option<&str>) -> Self {
        NewMessage {
            id: new_object_id(),
            kind: "at".to_string(),
            master_id: master_id.to_string(),
            author_id: author_id.to_string(),
            order_id: order_id.to_string(),
            reply_id: reply_id.map(str::to_string),
        }
    }

    pub async fn create_many(db: &Db, msgs: Vec<NewMessage>) -> MR<usize> {
        if msgs.is_empty() {
            return Ok(0);
        }
        db.run(move |c| insert_into(messages::table).values(&msgs).execute(c))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(id: &str, author_id: &str) -> Order {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Order {
            id: id.to_string(),
            title: "hello".to_string(),
            content: "world".to_string(),
            tab: "share".to_string(),
            author_id: author_id.to_string(),
            reply_count: 0,
            visit_count: 0,
            collect_count: 0,
            last_reply: None,
            last_reply_at: t,
            top: false,
            good: false,
            lock: false,
            deleted: false,
            create_at: t,
            update_at: t,
        }
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            loginname: format!("u{}", id),
            token: String::new(),
            score: 0,
            order_count: 0,
            reply_count: 0,
            collect_order_count: 0,
            is_admin: false,
        }
    }

    fn reply(id: &str, minute: u32, deleted: bool) -> Reply {
        Reply {
            id: id.to_string(),
            order_id: "o".to_string(),
            author_id: "a".to_string(),
            content: String::new(),
            deleted,
            create_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    #[test]
    fn drops_orders_without_author_keeping_order() {
        let orders = vec![order("1", "a"), order("2", "gone"), order("3", "b"), order("4", "c")];
        let joined = vec![
            (Some(user("a")), None),
            (None, None),
            (Some(user("b")), Some(reply("r", 1, false))),
            (Some(user("c")), None),
        ];
        let items = attach_authors(orders, joined);
        let ids: Vec<&str> = items.iter().map(|i| i.order.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
        assert_eq!(items[1].author.id, "b");
        assert_eq!(items[1].reply.as_ref().map(|r| r.id.as_str()), Some("r"));
    }

    #[test]
    fn newest_live_reply_query() {
        let sql = diesel::debug_query::<Pg, _>(&Reply::newest_live_query("o")).to_string();
        assert!(sql.contains("SELECT \"replies\".\"id\""), "{}", sql);
        assert!(sql.contains("\"replies\".\"order_id\" = "), "{}", sql);
        assert!(sql.contains("\"replies\".\"deleted\" = "), "{}", sql);
        assert!(sql.contains("ORDER BY \"replies\".\"create_at\" DESC"), "{}", sql);
        assert!(sql.contains("binds: [\"o\", false]"), "{}", sql);
    }

    #[test]
    fn collect_twice_is_ignored() {
        let nc = NewOrderCollect {
            id: "c".to_string(),
            user_id: "u".to_string(),
            order_id: "o".to_string(),
        };
        let sql = diesel::debug_query::<Pg, _>(&nc.insert_query()).to_string();
        assert!(sql.contains("INSERT INTO \"order_collects\""), "{}", sql);
        assert!(sql.contains("ON CONFLICT DO NOTHING"), "{}", sql);
    }

    #[test]
    fn query_excludes_deleted() {
        let sql = diesel::debug_query::<Pg, _>(&OrderQuery::default().boxed()).to_string();
        assert!(sql.contains("\"orders\".\"deleted\" = $1"), "{}", sql);
        assert!(sql.contains("binds: [false]"), "{}", sql);
    }

    #[test]
    fn query_filters_and_options() {
        let q = OrderQuery {
            author_id: Some("a".to_string()),
            exclude_ids: vec!["x".to_string()],
            reply_count: Some(0),
            tab: None,
            tab_ne: Some("job".to_string()),
        };
        let sql = diesel::debug_query::<Pg, _>(
            &q.with_options(QueryOptions::new(5, OrderSort::LastReplyAtDesc)),
        )
        .to_string();
        assert!(sql.contains("\"orders\".\"deleted\" = "), "{}", sql);
        assert!(sql.contains("\"orders\".\"author_id\" = "), "{}", sql);
        assert!(sql.contains("\"orders\".\"id\""), "{}", sql);
        assert!(sql.contains("\"orders\".\"tab\" != "), "{}", sql);
        assert!(sql.contains("ORDER BY \"orders\".\"last_reply_at\" DESC"), "{}", sql);
        assert!(sql.contains("LIMIT"), "{}", sql);
    }
}
