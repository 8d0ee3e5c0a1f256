//! Minimal HTML pages. Real rendering lives in the frontend; these exist so
//! the page routes have something behind them.

use axum::{Router, response::Html, routing::get};

use crate::auth::Session;

pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/signin", get(signin))
        .route("/signup", get(signup))
        .route("/dashboard", get(dashboard))
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{} - FileVault</title></head><body>{}</body></html>",
        title, body
    ))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

async fn home() -> Html<String> {
    page(
        "Home",
        "<h1>FileVault</h1><p><a href=\"/signin\">Sign in</a> or <a href=\"/signup\">create an account</a>.</p>",
    )
}

async fn signin() -> Html<String> {
    page("Sign in", "<h1>Sign in</h1><div id=\"signin\"></div>")
}

async fn signup() -> Html<String> {
    page("Sign up", "<h1>Sign up</h1><div id=\"signup\"></div>")
}

async fn dashboard(Session(identity): Session) -> Html<String> {
    page(
        "Dashboard",
        &format!(
            "<h1>Dashboard</h1><p>Signed in as {}</p><div id=\"files\"></div>",
            escape_html(&identity.email)
        ),
    )
}
