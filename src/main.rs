#[macro_use]
extern crate rocket;

#[macro_use]
extern crate diesel;

#[macro_use]
extern crate diesel_migrations;

mod api;
mod cache;
mod config;
mod db_conn;
mod mention;
mod models;
mod random_hasher;
mod rds_conn;
mod schema;
mod validate;

use config::SiteConfig;
use db_conn::Db;
use random_hasher::RandomHasher;
use rds_conn::init_rds_client;
use rocket::fairing::AdHoc;
use rocket::fs::FileServer;
use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;
use std::env;

embed_migrations!();

#[launch]
async fn rocket() -> _ {
    load_env();
    env_logger::init();

    let redis_url = env::var("REDIS_URL").expect("REDIS_URL must be set");
    let rmc = init_rds_client(&redis_url)
        .await
        .expect("connect to redis fail");

    let rocket = rocket::build();
    let site = load_site_config(&rocket);
    std::fs::create_dir_all(&site.upload_dir).expect("create upload dir fail");

    rocket
        .mount(
            "/",
            routes![
                api::list::home,
                api::list::recent_ids,
                api::order::create,
                api::order::put,
                api::order::index,
                api::order::show_edit,
                api::order::update,
                api::order::delete,
                api::order::top,
                api::order::good,
                api::order::lock,
                api::order::collect,
                api::order::de_collect,
                api::order::upload,
                api::reply::add_reply,
                api::reply::delete_reply,
                api::pages::about,
                api::pages::contact,
                api::pages::jobs,
                api::pages::faq,
                api::pages::api,
            ],
        )
        .mount(site.upload_url_prefix.clone(), FileServer::from(&site.upload_dir))
        .register(
            "/",
            catchers![
                api::catch_401_error,
                api::catch_403_error,
                api::catch_404_error
            ],
        )
        .manage(site)
        .manage(RandomHasher::get_random_one())
        .manage(rmc)
        .attach(Db::fairing())
        .attach(AdHoc::on_ignite("Run migrations", run_migrations))
        .attach(Template::fairing())
}

fn load_site_config(rocket: &Rocket<Build>) -> SiteConfig {
    match rocket.figment().extract_inner::<SiteConfig>("site") {
        Ok(site) => site,
        Err(e) => {
            log::warn!("no usable [site] config ({}), using defaults", e);
            SiteConfig::default()
        }
    }
}

async fn run_migrations(rocket: Rocket<Build>) -> Rocket<Build> {
    let db = Db::get_one(&rocket).await.expect("database connection");
    db.run(|c| embedded_migrations::run(c))
        .await
        .expect("diesel migrations");
    rocket
}

fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => eprintln!("Configuration read from {}", path.display()),
        Err(ref e) if e.not_found() => eprintln!("Warning: no .env was found"),
        e => e.map(|_| ()).unwrap(),
    }
}
