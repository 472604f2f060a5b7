use crate::api::{notify_page, AdminUser, AppError, CurrentUser, Page, PageResult, Referer, API};
use crate::cache::NoReplyOrdersCache;
use crate::config::SiteConfig;
use crate::db_conn::Db;
use crate::mention;
use crate::models::*;
use crate::random_hasher::{is_object_id, RandomHasher};
use crate::rds_conn::RdsConn;
use crate::validate::{escape, OrderDraft};
use log::warn;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::futures::{future::TryFutureExt, try_join};
use rocket::http::{ContentType, Status};
use rocket::response::Redirect;
use rocket::serde::json::{json, Value};
use rocket::State;
use rocket_dyn_templates::Template;

const NO_SUCH_ORDER: &str = "此话题不存在或已被删除。";

#[derive(FromForm)]
pub struct OrderInput {
    #[field(default = String::new())]
    title: String,
    #[field(default = String::new())]
    tab: String,
    #[field(default = String::new())]
    tabgrade: String,
    #[field(name = "t_content", default = String::new())]
    content: String,
}

#[derive(FromForm)]
pub struct CollectInput {
    order_id: String,
}

#[derive(FromForm)]
pub struct UploadInput<'r> {
    file: TempFile<'r>,
}

fn edit_form(site: &SiteConfig, mut ctx: Value) -> Template {
    ctx["tabs"] = json!(site.tabs);
    ctx["grades"] = json!(site.grades);
    Template::render("order/edit", ctx)
}

/// The cleaned draft, or the form shown again with the first problem.
fn checked_draft(
    site: &SiteConfig,
    oi: &OrderInput,
    mut ctx: Value,
) -> Result<OrderDraft, Page> {
    let draft = OrderDraft::clean(&oi.title, &oi.tab, &oi.content);
    match draft.check(site) {
        Ok(()) => Ok(draft),
        Err(msg) => {
            ctx["edit_error"] = json!(msg);
            ctx["title"] = json!(draft.title);
            ctx["content"] = json!(draft.content);
            ctx["tab"] = json!(draft.tab);
            Err(Page::Invalid(edit_form(site, ctx)))
        }
    }
}

/// Existing, not deleted order, or a 404.
async fn find_order(db: &Db, id: &str) -> API<Order> {
    if !is_object_id(id) {
        return Err(AppError::NotFound(NO_SUCH_ORDER));
    }
    Order::get(db, id)
        .await?
        .filter(|o| !o.deleted)
        .ok_or(AppError::NotFound(NO_SUCH_ORDER))
}

/// The order, when `user` may change it.
async fn find_editable(db: &Db, id: &str, user: &CurrentUser) -> API<Order> {
    let (order, _, _) = Order::get_with_author(db, id)
        .await?
        .filter(|(o, _, _)| !o.deleted)
        .ok_or(AppError::NotFound(NO_SUCH_ORDER))?;
    user.ensure_can_edit(&order.author_id)?;
    Ok(order)
}

// 通知失败不影响发帖
async fn notify_mentions(db: &Db, order: &Order, author_id: &str) {
    mention::send_message_to_mention_users(db, &order.content, &order.id, None, author_id)
        .await
        .unwrap_or_else(|e| {
            warn!("send mention messages for order {} failed: {}", order.id, e);
            0
        });
}

async fn no_reply_orders(db: &Db, rconn: &RdsConn, ttl: usize) -> API<Vec<OrderItem>> {
    let mut cacher = NoReplyOrdersCache::init(rconn, ttl);
    if let Some(items) = cacher.get().await {
        return Ok(items);
    }
    let items = Order::list_by_query(
        db,
        OrderQuery {
            reply_count: Some(0),
            tab_ne: Some("job".to_string()),
            ..Default::default()
        },
        QueryOptions::new(5, OrderSort::CreateAtDesc),
    )
    .await?;
    cacher.set(&items).await;
    Ok(items)
}

async fn is_collected(db: &Db, user: Option<&CurrentUser>, order_id: &str) -> API<bool> {
    Ok(match user {
        Some(u) => OrderCollect::get(db, &u.user.id, order_id).await?.is_some(),
        None => false,
    })
}

#[get("/order/create")]
pub fn create(_user: CurrentUser, site: &State<SiteConfig>) -> Template {
    edit_form(site, json!({ "action": "create" }))
}

#[post("/order/create", data = "<oi>")]
pub async fn put(
    oi: Form<OrderInput>,
    mut user: CurrentUser,
    site: &State<SiteConfig>,
    db: Db,
    rconn: RdsConn,
) -> PageResult {
    let ctx = json!({
        "action": "create",
        "tabgrade": escape(oi.tabgrade.trim()),
    });
    let draft = match checked_draft(site, &oi, ctx) {
        Ok(draft) => draft,
        Err(page) => return Ok(page),
    };

    let order = Order::create(&db, draft, &user.user.id).await?;
    let author = User::award_order(&db, &user.user.id).await?;
    user.refresh(author, &rconn).await;
    notify_mentions(&db, &order, &user.user.id).await;

    Ok(Page::Redirect(Redirect::to(format!("/order/{}", order.id))))
}

#[get("/order/<oid>")]
pub async fn index(
    oid: &str,
    user: Option<CurrentUser>,
    site: &State<SiteConfig>,
    db: Db,
    rconn: RdsConn,
) -> PageResult {
    if !is_object_id(oid) {
        return Err(AppError::NotFound("此订单不存在或已被删除。"));
    }
    let mut full = Order::get_full(&db, oid)
        .await?
        .map_err(AppError::NotFound)?;
    full.order.incr_visit(&db).await?;
    let replies = Reply::gets_by_order_id(&db, oid).await?;

    let other_query = OrderQuery {
        author_id: Some(full.order.author_id.clone()),
        exclude_ids: vec![full.order.id.clone()],
        ..Default::default()
    };
    let (other_orders, no_reply_orders, is_collect) = try_join!(
        Order::list_by_query(
            &db,
            other_query,
            QueryOptions::new(5, OrderSort::LastReplyAtDesc)
        )
        .err_into::<AppError>(),
        no_reply_orders(&db, &rconn, site.no_reply_cache_secs),
        is_collected(&db, user.as_ref(), oid),
    )?;

    Ok(Page::View(Template::render(
        "order/index",
        json!({
            "order": full.order,
            "linked_content": full.linked_content,
            "author": full.author,
            "replies": replies,
            "other_orders": other_orders,
            "no_reply_orders": no_reply_orders,
            "is_collect": is_collect,
            "can_edit": user.as_ref().map(|u| u.can_edit(&full.order.author_id)).unwrap_or(false),
            "current_user": user.as_ref().map(|u| &u.user),
        }),
    )))
}

#[get("/order/<tid>/edit")]
pub async fn show_edit(
    tid: &str,
    user: CurrentUser,
    site: &State<SiteConfig>,
    db: Db,
) -> PageResult {
    let order = find_editable(&db, tid, &user).await?;
    Ok(Page::View(edit_form(
        site,
        json!({
            "action": "edit",
            "order_id": order.id,
            "title": order.title,
            "content": order.content,
            "tab": order.tab,
        }),
    )))
}

#[post("/order/<tid>/edit", data = "<oi>")]
pub async fn update(
    tid: &str,
    oi: Form<OrderInput>,
    user: CurrentUser,
    site: &State<SiteConfig>,
    db: Db,
) -> PageResult {
    let mut order = find_editable(&db, tid, &user).await?;

    let ctx = json!({ "action": "edit", "order_id": order.id });
    let draft = match checked_draft(site, &oi, ctx) {
        Ok(draft) => draft,
        Err(page) => return Ok(page),
    };

    order.update_content(&db, draft).await?;
    notify_mentions(&db, &order, &user.user.id).await;

    Ok(Page::Redirect(Redirect::to(format!("/order/{}", order.id))))
}

#[post("/order/<tid>/delete")]
pub async fn delete(tid: &str, user: CurrentUser, db: Db) -> (Status, Value) {
    let mut order = match Order::get(&db, tid).await {
        Err(e) => return (Status::Ok, json!({ "success": false, "message": e.to_string() })),
        Ok(Some(o)) if !o.deleted => o,
        Ok(_) => {
            return (
                Status::UnprocessableEntity,
                json!({ "success": false, "message": NO_SUCH_ORDER }),
            )
        }
    };
    if !user.can_edit(&order.author_id) {
        return (
            Status::Forbidden,
            json!({ "success": false, "message": "无权限" }),
        );
    }
    match order.set_deleted(&db).await {
        Err(e) => (Status::Ok, json!({ "success": false, "message": e.to_string() })),
        Ok(()) => (
            Status::Ok,
            json!({ "success": true, "message": "话题已被删除。" }),
        ),
    }
}

fn flag_notice(msg: &str, referer: Referer) -> Page {
    Page::View(notify_page(json!({ "success": msg, "referer": referer.0 })))
}

#[post("/order/<tid>/top")]
pub async fn top(tid: &str, _admin: AdminUser, referer: Referer, db: Db) -> PageResult {
    let mut order = find_order(&db, tid).await?;
    let msg = if order.toggle_top(&db).await? {
        "此话题已置顶。"
    } else {
        "此话题已取消置顶。"
    };
    Ok(flag_notice(msg, referer))
}

#[post("/order/<tid>/good")]
pub async fn good(tid: &str, _admin: AdminUser, referer: Referer, db: Db) -> PageResult {
    let mut order = find_order(&db, tid).await?;
    let msg = if order.toggle_good(&db).await? {
        "此话题已加精。"
    } else {
        "此话题已取消加精。"
    };
    Ok(flag_notice(msg, referer))
}

// 锁定后不可再回复
#[post("/order/<tid>/lock")]
pub async fn lock(tid: &str, _admin: AdminUser, referer: Referer, db: Db) -> PageResult {
    let mut order = find_order(&db, tid).await?;
    let msg = if order.toggle_lock(&db).await? {
        "此话题已锁定。"
    } else {
        "此话题已取消锁定。"
    };
    Ok(flag_notice(msg, referer))
}

#[post("/order/collect", data = "<ci>")]
pub async fn collect(
    ci: Form<CollectInput>,
    mut user: CurrentUser,
    db: Db,
    rconn: RdsConn,
) -> API<Value> {
    let mut order = match find_order(&db, &ci.order_id).await {
        Ok(o) => o,
        Err(AppError::NotFound(_)) => return Ok(json!({ "status": "failed" })),
        Err(e) => return Err(e),
    };
    // 重复收藏不再计数
    if OrderCollect::create(&db, &user.user.id, &order.id).await? > 0 {
        let (u, _) = try_join!(
            User::change_collect_count(&db, &user.user.id, 1),
            order.change_collect_count(&db, 1),
        )?;
        user.refresh(u, &rconn).await;
    }

    Ok(json!({ "status": "success" }))
}

#[post("/order/de_collect", data = "<ci>")]
pub async fn de_collect(
    ci: Form<CollectInput>,
    mut user: CurrentUser,
    db: Db,
    rconn: RdsConn,
) -> API<Value> {
    let mut order = match find_order(&db, &ci.order_id).await {
        Ok(o) => o,
        Err(AppError::NotFound(_)) => return Ok(json!({ "status": "failed" })),
        Err(e) => return Err(e),
    };

    if OrderCollect::remove(&db, &user.user.id, &order.id).await? > 0 {
        let (u, _) = try_join!(
            User::change_collect_count(&db, &user.user.id, -1),
            order.change_collect_count(&db, -1),
        )?;
        user.refresh(u, &rconn).await;
    }

    Ok(json!({ "status": "success" }))
}

/// Extension to store an upload under; only raster images are accepted.
fn image_ext(ct: Option<&ContentType>) -> Option<&'static str> {
    let ct = ct?;
    if !ct.top().as_str().eq_ignore_ascii_case("image") {
        return None;
    }
    match ct.sub().as_str().to_ascii_lowercase().as_str() {
        "png" => Some("png"),
        "jpeg" | "jpg" | "pjpeg" => Some("jpg"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "bmp" => Some("bmp"),
        _ => None,
    }
}

#[post("/upload", data = "<ui>")]
pub async fn upload(
    _user: CurrentUser,
    mut ui: Form<UploadInput<'_>>,
    site: &State<SiteConfig>,
    rh: &State<RandomHasher>,
) -> API<Value> {
    let file = &mut ui.file;
    let ext = match image_ext(file.content_type()) {
        Some(ext) => ext,
        None => return Ok(json!({ "success": false, "message": "只能上传图片。" })),
    };
    let filename = rh.upload_name(file.name().unwrap_or("file"), ext);

    file.copy_to(format!("{}/{}", site.upload_dir, filename))
        .await?;

    Ok(json!({
        "success": true,
        "url": format!("{}/{}", site.upload_url_prefix, filename),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::ContentType;
    use rocket::local::blocking::Client;

    #[test]
    fn only_images_are_stored() {
        assert_eq!(image_ext(Some(&ContentType::PNG)), Some("png"));
        assert_eq!(image_ext(Some(&ContentType::JPEG)), Some("jpg"));
        assert_eq!(image_ext(Some(&ContentType::GIF)), Some("gif"));
        assert_eq!(image_ext(Some(&ContentType::HTML)), None);
        assert_eq!(image_ext(Some(&ContentType::SVG)), None);
        assert_eq!(image_ext(Some(&ContentType::new("image", "svg+xml"))), None);
        assert_eq!(image_ext(Some(&ContentType::Plain)), None);
        assert_eq!(image_ext(None), None);
    }

    #[post("/draft", data = "<oi>")]
    fn draft(oi: Form<OrderInput>, site: &State<SiteConfig>) -> Page {
        match checked_draft(site, &oi, json!({ "action": "create" })) {
            Ok(_) => Page::Redirect(Redirect::to("/")),
            Err(page) => page,
        }
    }

    fn client() -> Client {
        let rocket = rocket::build()
            .mount("/", routes![draft])
            .manage(SiteConfig::default())
            .attach(Template::fairing());
        Client::tracked(rocket).expect("valid rocket instance")
    }

    #[test]
    fn invalid_draft_is_rerendered_with_422() {
        let client = client();
        let response = client
            .post("/draft")
            .header(ContentType::Form)
            .body("title=abcd&tab=share&t_content=hi")
            .dispatch();
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body = response.into_string().unwrap();
        assert!(body.contains("标题字数太多或太少。"));
        assert!(body.contains("abcd"));
    }

    #[test]
    fn valid_draft_goes_on() {
        let client = client();
        let response = client
            .post("/draft")
            .header(ContentType::Form)
            .body("title=hello+world&tab=share&t_content=hi")
            .dispatch();
        assert_eq!(response.status(), Status::SeeOther);
    }
}
