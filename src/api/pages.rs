use rocket::serde::json::json;
use rocket_dyn_templates::Template;

#[get("/about")]
pub fn about() -> Template {
    Template::render("static/about", json!({ "pageTitle": "关于我们" }))
}

#[get("/contact")]
pub fn contact() -> Template {
    Template::render("static/contact", json!({ "pageTitle": "联系我们" }))
}

#[get("/jobs")]
pub fn jobs() -> Template {
    Template::render("static/jobs", json!({ "pageTitle": "诚聘英才" }))
}

#[get("/faq")]
pub fn faq() -> Template {
    Template::render("static/faq", json!({}))
}

#[get("/api")]
pub fn api() -> Template {
    Template::render("static/api", json!({}))
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;
    use rocket::local::blocking::Client;
    use rocket_dyn_templates::Template;

    fn client() -> Client {
        let rocket = rocket::build()
            .mount(
                "/",
                routes![super::about, super::contact, super::jobs, super::faq, super::api],
            )
            .attach(Template::fairing());
        Client::tracked(rocket).expect("valid rocket instance")
    }

    #[test]
    fn titled_pages() {
        let client = client();
        for (path, title) in [("/about", "关于我们"), ("/contact", "联系我们"), ("/jobs", "诚聘英才")] {
            let response = client.get(path).dispatch();
            assert_eq!(response.status(), Status::Ok);
            assert!(response.into_string().unwrap().contains(title));
        }
    }

    #[test]
    fn untitled_pages() {
        let client = client();
        for path in ["/faq", "/api"] {
            assert_eq!(client.get(path).dispatch().status(), Status::Ok);
        }
    }
}
