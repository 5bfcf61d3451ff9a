use actix_web::{App, HttpResponse, HttpServer, web};

fn html(body: &'static str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

const INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>Fixture Site Home for Integration Testing</title>
  <meta name="viewport" content="width=device-width">
  <meta name="description" content="A small fixture website used by the integration tests to exercise the crawler end to end.">
  <script type="application/ld+json">{"@context": "https://schema.org", "@type": "Organization", "name": "Fixture", "url": "/"}</script>
</head>
<body>
  <h1>Fixture</h1>
  <a href="/about">About us</a>
  <a href="/blog/">Blog</a>
  <a href="/missing">Missing</a>
  <a href="/old">Old page</a>
  <a href="/private/secret">Secret</a>
  <a href="https://external.test/">External</a>
</body>
</html>"#;

const ABOUT: &str = r#"<html lang="en"><head><title>About</title></head>
<body><h1>About</h1><img src="/team.png"><a href="/">Home</a></body></html>"#;

const BLOG: &str = r#"<html lang="en"><head><title>Blog</title></head>
<body><h1>Blog</h1><a href="/about#team">Team</a></body></html>"#;

const SECRET: &str = r#"<html><head><title>Secret</title></head><body>hidden</body></html>"#;

const ROBOTS: &str = "User-agent: *\nDisallow: /private/\n";

/// Starts the fixture site on an ephemeral port and returns its base URL (no trailing slash).
pub async fn start_fixture_site() -> String {
    let server = HttpServer::new(|| {
        App::new()
            .route("/", web::get().to(|| async { html(INDEX) }))
            .route("/about", web::get().to(|| async { html(ABOUT) }))
            .route("/blog", web::get().to(|| async { html(BLOG) }))
            .route("/private/secret", web::get().to(|| async { html(SECRET) }))
            .route(
                "/old",
                web::get().to(|| async {
                    HttpResponse::MovedPermanently()
                        .append_header(("Location", "/gone"))
                        .finish()
                }),
            )
            .route(
                "/robots.txt",
                web::get().to(|| async { HttpResponse::Ok().content_type("text/plain").body(ROBOTS) }),
            )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("Failed to bind test server");

    let addr = server
        .addrs()
        .first()
        .cloned()
        .expect("No address bound");
    let running = server.run();
    tokio::spawn(async move {
        if let Err(e) = running.await {
            eprintln!("Test server error: {}", e);
        }
    });

    format!("http://{}", addr)
}
