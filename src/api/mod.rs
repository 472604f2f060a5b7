use crate::cache::UserCache;
use crate::db_conn::Db;
use crate::models::User;
use crate::rds_conn::RdsConn;
use log::error;
use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::response::{self, Redirect, Responder};
use rocket::serde::json::{json, Value};
use rocket_dyn_templates::Template;
use std::convert::Infallible;
use url::Url;

pub fn notify_page(ctx: Value) -> Template {
    Template::render("notify/notify", ctx)
}

pub fn error_page(msg: &str) -> Template {
    notify_page(json!({ "error": msg, "referer": "/" }))
}

#[catch(401)]
pub fn catch_401_error() -> Template {
    error_page("你还没有登录。")
}

#[catch(403)]
pub fn catch_403_error() -> Template {
    error_page("无权限")
}

#[catch(404)]
pub fn catch_404_error() -> Template {
    error_page("页面不存在。")
}

pub fn can_edit(user: &User, author_id: &str) -> bool {
    user.is_admin || user.id == author_id
}

pub struct CurrentUser {
    pub token: String,
    pub user: User,
}

impl CurrentUser {
    pub fn can_edit(&self, author_id: &str) -> bool {
        can_edit(&self.user, author_id)
    }

    pub fn ensure_can_edit(&self, author_id: &str) -> API<()> {
        if self.can_edit(author_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("对不起，你不能编辑此话题。"))
        }
    }

    /// Replace the cached copy after counters changed.
    pub async fn refresh(&mut self, u: User, rconn: &RdsConn) {
        UserCache::init(&self.token, rconn).set(&u).await;
        self.user = u;
    }
}

fn request_token(request: &Request<'_>) -> Option<String> {
    request
        .headers()
        .get_one("User-Token")
        .map(str::to_string)
        .or_else(|| request.cookies().get("token").map(|c| c.value().to_string()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = match request_token(request) {
            Some(t) => t,
            None => return request::Outcome::Failure((Status::Unauthorized, ())),
        };
        let rconn = try_outcome!(request.guard::<RdsConn>().await);
        let mut cacher = UserCache::init(&token, &rconn);
        if let Some(user) = cacher.get().await {
            return request::Outcome::Success(CurrentUser { token, user });
        }

        let db = try_outcome!(request.guard::<Db>().await);
        match User::get_by_token(&db, &token).await {
            Ok(Some(user)) => {
                cacher.set(&user).await;
                request::Outcome::Success(CurrentUser { token, user })
            }
            Ok(None) => request::Outcome::Failure((Status::Unauthorized, ())),
            Err(e) => {
                error!("look up user by token failed: {}", e);
                request::Outcome::Failure((Status::InternalServerError, ()))
            }
        }
    }
}

pub struct AdminUser(pub CurrentUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let user = try_outcome!(request.guard::<CurrentUser>().await);
        if user.user.is_admin {
            request::Outcome::Success(AdminUser(user))
        } else {
            request::Outcome::Failure((Status::Forbidden, ()))
        }
    }
}

/// Where to send the visitor back to; "/" when the header is absent or unusable.
pub struct Referer(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Referer {
    type Error = Infallible;
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let referer = request
            .headers()
            .get_one("Referer")
            .and_then(|h| Url::parse(h).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| "/".to_string());
        request::Outcome::Success(Referer(referer))
    }
}

#[derive(Responder)]
pub enum Page {
    View(Template),
    Redirect(Redirect),
    #[response(status = 422)]
    Invalid(Template),
}

#[derive(Debug)]
pub enum AppError {
    NotFound(&'static str),
    Forbidden(&'static str),
    Invalid(&'static str),
    DbError(diesel::result::Error),
    RdsError(redis::RedisError),
    IoError(std::io::Error),
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> AppError {
        match err {
            diesel::result::Error::NotFound => AppError::NotFound("此话题不存在或已被删除。"),
            e => AppError::DbError(e),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> AppError {
        AppError::RdsError(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> AppError {
        AppError::IoError(err)
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (status, msg) = match self {
            AppError::NotFound(msg) => (Status::NotFound, msg),
            AppError::Forbidden(msg) => (Status::Forbidden, msg),
            AppError::Invalid(msg) => (Status::UnprocessableEntity, msg),
            AppError::DbError(e) => {
                error!("{} {}: database error: {}", req.method(), req.uri(), e);
                (Status::InternalServerError, "服务器出错了。")
            }
            AppError::RdsError(e) => {
                error!("{} {}: redis error: {}", req.method(), req.uri(), e);
                (Status::InternalServerError, "服务器出错了。")
            }
            AppError::IoError(e) => {
                error!("{} {}: io error: {}", req.method(), req.uri(), e);
                (Status::InternalServerError, "服务器出错了。")
            }
        };
        (status, error_page(msg)).respond_to(req)
    }
}

pub type API<T> = Result<T, AppError>;
pub type PageResult = API<Page>;

pub mod list;
pub mod order;
pub mod pages;
pub mod reply;

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::local::blocking::Client;

    fn user(id: &str, is_admin: bool) -> User {
        User {
            id: id.to_string(),
            loginname: id.to_string(),
            token: String::new(),
            score: 0,
            order_count: 0,
            reply_count: 0,
            collect_order_count: 0,
            is_admin,
        }
    }

    #[test]
    fn author_may_edit() {
        assert!(can_edit(&user("a", false), "a"));
    }

    #[test]
    fn admin_may_edit() {
        assert!(can_edit(&user("root", true), "a"));
    }

    #[test]
    fn others_may_not_edit() {
        assert!(!can_edit(&user("b", false), "a"));
    }

    #[test]
    fn diesel_not_found_is_not_found_page() {
        match AppError::from(diesel::result::Error::NotFound) {
            AppError::NotFound(_) => (),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[get("/edit/<uid>/<author_id>")]
    fn edit(uid: &str, author_id: &str) -> PageResult {
        let current = CurrentUser {
            token: String::new(),
            user: user(uid, uid == "root"),
        };
        current.ensure_can_edit(author_id)?;
        Ok(Page::View(notify_page(json!({ "success": "ok" }))))
    }

    #[get("/missing")]
    fn missing() -> PageResult {
        Err(AppError::NotFound("此话题不存在或已被删除。"))
    }

    #[get("/invalid")]
    fn invalid() -> Page {
        Page::Invalid(error_page("内容不可为空"))
    }

    fn client() -> Client {
        let rocket = rocket::build()
            .mount("/", routes![edit, missing, invalid])
            .attach(Template::fairing());
        Client::tracked(rocket).expect("valid rocket instance")
    }

    #[test]
    fn edit_status_by_user() {
        let client = client();
        assert_eq!(client.get("/edit/a/a").dispatch().status(), Status::Ok);
        assert_eq!(client.get("/edit/root/a").dispatch().status(), Status::Ok);
        let response = client.get("/edit/b/a").dispatch();
        assert_eq!(response.status(), Status::Forbidden);
        assert!(response.into_string().unwrap().contains("对不起，你不能编辑此话题。"));
    }

    #[test]
    fn error_statuses() {
        let client = client();
        assert_eq!(client.get("/missing").dispatch().status(), Status::NotFound);
        let response = client.get("/invalid").dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
        assert!(response.into_string().unwrap().contains("内容不可为空"));
    }
}
