//! A date-range function served by the local host.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example dates
//!
//! Try:
//!   curl 'http://localhost:8080/?start_date=2024-01-01&end_date=2024-01-31'
//!   curl 'http://localhost:8080/?start_date=2024-02-01'          # 422
//!   curl -X POST 'http://localhost:8080/'                        # 405

use std::time::Duration;

use fnbridge::{Config, Entry, IntoResponse, Json, Request, Response, Server, StatusCode};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Range<'a> {
    start_date: &'a str,
    end_date: &'a str,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let entry = match Entry::new(config).get(dates) {
        Ok(entry) => entry,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Server::bind(([0, 0, 0, 0], 8080)).serve(entry).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

// GET /?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD
async fn dates(req: Request) -> Response {
    tokio::time::sleep(Duration::from_millis(100)).await; // simulate async work

    let (Some(start_date), Some(end_date)) = (req.query("start_date"), req.query("end_date")) else {
        return unprocessable(r#"{"detail":"start_date and end_date are required"}"#);
    };
    if !is_date(start_date) || !is_date(end_date) {
        return unprocessable(r#"{"detail":"dates must be YYYY-MM-DD"}"#);
    }

    Json(Range { start_date, end_date }).into_response()
}

fn unprocessable(detail: &'static str) -> Response {
    Response::builder().status(StatusCode::UNPROCESSABLE_ENTITY).json(detail)
}

fn is_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter().enumerate().all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}
