use crate::api::{AppError, CurrentUser, Page, PageResult, API};
use crate::db_conn::Db;
use crate::mention;
use crate::models::*;
use crate::rds_conn::RdsConn;
use log::warn;
use rocket::form::Form;
use rocket::futures::try_join;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::serde::json::{json, Value};

#[derive(FromForm)]
pub struct ReplyInput {
    #[field(name = "r_content", default = String::new())]
    content: String,
}

#[post("/order/<oid>/reply", data = "<ri>")]
pub async fn add_reply(
    oid: &str,
    ri: Form<ReplyInput>,
    mut user: CurrentUser,
    db: Db,
    rconn: RdsConn,
) -> PageResult {
    let order = Order::get(&db, oid)
        .await?
        .filter(|o| !o.deleted)
        .ok_or(AppError::NotFound("此话题不存在或已被删除。"))?;
    if order.lock {
        return Err(AppError::Forbidden("此主题已锁定。"));
    }
    let content = ri.content.trim();
    if content.is_empty() {
        return Err(AppError::Invalid("回复内容不能为空!"));
    }

    let reply = Reply::create(&db, &order.id, &user.user.id, content.to_string()).await?;
    let (_, u) = try_join!(
        Order::update_last_reply(&db, &order.id, &reply.id),
        User::change_reply_count(&db, &user.user.id, 1),
    )?;
    user.refresh(u, &rconn).await;

    mention::send_message_to_mention_users(
        &db,
        &reply.content,
        &order.id,
        Some(&reply.id),
        &user.user.id,
    )
    .await
    .unwrap_or_else(|e| {
        warn!("send mention messages for reply {} failed: {}", reply.id, e);
        0
    });

    Ok(Page::Redirect(Redirect::to(format!(
        "/order/{}#{}",
        order.id, reply.id
    ))))
}

#[post("/reply/<rid>/delete")]
pub async fn delete_reply(
    rid: &str,
    mut user: CurrentUser,
    db: Db,
    rconn: RdsConn,
) -> API<(Status, Value)> {
    let mut reply = match Reply::get(&db, rid).await? {
        Some(r) if !r.deleted => r,
        _ => {
            return Ok((
                Status::UnprocessableEntity,
                json!({ "status": "failed", "message": "此回复不存在或已被删除。" }),
            ))
        }
    };
    if !user.can_edit(&reply.author_id) {
        return Ok((Status::Forbidden, json!({ "status": "failed" })));
    }

    reply.set_deleted(&db).await?;
    Order::reduce_count(&db, &reply.order_id)
        .await
        .map_err(|e| match e {
            diesel::result::Error::NotFound => AppError::NotFound("该主题不存在"),
            e => AppError::from(e),
        })?;
    let author = User::change_reply_count(&db, &reply.author_id, -1).await?;
    if author.id == user.user.id {
        user.refresh(author, &rconn).await;
    }

    Ok((Status::Ok, json!({ "status": "success" })))
}
