use crate::api::{Page, PageResult, API};
use crate::config::SiteConfig;
use crate::db_conn::Db;
use crate::models::*;
use rocket::futures::try_join;
use rocket::serde::json::{json, Value};
use rocket::State;
use rocket_dyn_templates::Template;

const PAGE_SIZE: i64 = 20;
const MAX_PAGE: i64 = 100_000;

pub fn page_count(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

/// Page number from the query string, kept within `1..=MAX_PAGE`.
pub fn clamp_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).clamp(1, MAX_PAGE)
}

// 超出范围的页码只会得到空页
pub fn page_offset(page: i64) -> i64 {
    (page.max(1) - 1).checked_mul(PAGE_SIZE).unwrap_or(i64::MAX)
}

#[get("/?<tab>&<page>")]
pub async fn home(
    tab: Option<&str>,
    page: Option<i64>,
    site: &State<SiteConfig>,
    db: Db,
) -> PageResult {
    let page = clamp_page(page);
    let tab = tab.filter(|t| site.has_tab(t)).map(str::to_string);
    let query = OrderQuery {
        tab: tab.clone(),
        ..Default::default()
    };

    let (orders, total) = try_join!(
        Order::list_by_query(
            &db,
            query.clone(),
            QueryOptions {
                limit: PAGE_SIZE,
                offset: page_offset(page),
                sort: OrderSort::TopThenLastReply,
            }
        ),
        Order::count_by_query(&db, query),
    )?;

    Ok(Page::View(Template::render(
        "index",
        json!({
            "orders": orders,
            "tab": tab.unwrap_or_else(|| "all".to_string()),
            "tabs": site.tabs,
            "current_page": page,
            "pages": page_count(total),
            "page_numbers": (1..=page_count(total)).collect::<Vec<i64>>(),
        }),
    )))
}

// 供 sitemap 使用
#[get("/orders/ids")]
pub async fn recent_ids(db: Db) -> API<Value> {
    let ids = Order::recent_ids(&db).await?;
    Ok(json!({
        "data": ids,
        "count": ids.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(1), 1);
        assert_eq!(page_count(20), 1);
        assert_eq!(page_count(21), 2);
    }

    #[test]
    fn page_out_of_range() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(-7)), 1);
        assert_eq!(clamp_page(Some(i64::MAX)), MAX_PAGE);
        assert_eq!(clamp_page(Some(i64::MIN)), 1);
    }

    #[test]
    fn offsets_never_overflow() {
        assert_eq!(page_offset(1), 0);
        assert_eq!(page_offset(2), PAGE_SIZE);
        assert_eq!(page_offset(clamp_page(Some(i64::MAX))), (MAX_PAGE - 1) * PAGE_SIZE);
        assert_eq!(page_offset(i64::MAX), i64::MAX);
        assert_eq!(page_offset(i64::MIN), 0);
    }
}
