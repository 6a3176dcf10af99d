//! End-to-end behaviour of the bridge, from host request to host response.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use bytes::Bytes;
use fnbridge::{
    AsyncByteStream, Bridge, ContentType, Entry, Error, HostRequest, Json, Method, Request,
    RequestBody, Response, StatusCode, SyncByteStream, UploadedFile, to_normalized_request,
};
use futures::stream::{self, StreamExt};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use rstest::rstest;
use serde_json::json;

const URLENCODED: &str = "application/x-www-form-urlencoded";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Echoes what the endpoint saw: content type and raw body.
async fn echo(req: Request) -> Json<serde_json::Value> {
    Json(json!({
        "content_type": req.header("content-type"),
        "body": String::from_utf8_lossy(req.body()),
    }))
}

fn json_body(response: fnbridge::HostResponse) -> serde_json::Value {
    let body = response.into_body().collect_bytes().unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn get_with_query_returns_json() {
    init_tracing();
    async fn dates(req: Request) -> Json<serde_json::Value> {
        Json(json!({
            "start_date": req.query("start_date"),
            "end_date": req.query("end_date"),
        }))
    }

    let url = "http://fn.local/?start_date=2024-01-01&end_date=2024-01-31";
    let normalized = to_normalized_request(HostRequest::new("GET", url)).unwrap();
    assert_eq!(normalized.body, RequestBody::Empty);
    assert_eq!(normalized.query, [
        ("start_date".to_owned(), "2024-01-01".to_owned()),
        ("end_date".to_owned(), "2024-01-31".to_owned()),
    ]);

    let entry = Entry::default().get(dates).unwrap();
    let response = entry.invoke(HostRequest::new("GET", url)).unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.content_type().unwrap(), "application/json");
    assert_eq!(json_body(response), json!({ "start_date": "2024-01-01", "end_date": "2024-01-31" }));
}

#[test]
fn form_with_file_goes_out_as_multipart() {
    init_tracing();
    let upload = || {
        UploadedFile::new("f", SyncByteStream::from_iter([Ok(Bytes::from_static(b"file body"))]))
            .filename("x.txt")
            .content_type("text/plain")
    };
    let request = || {
        HostRequest::new("POST", "http://fn.local/")
            .header("Content-Type", "multipart/form-data; boundary=inbound")
            .form("name", "a")
            .file(upload())
    };

    let normalized = to_normalized_request(request()).unwrap();
    assert_eq!(normalized.body, RequestBody::Form(vec![("name".to_owned(), "a".to_owned())]));
    assert_eq!(normalized.files.len(), 1);
    assert_eq!(normalized.header(&CONTENT_TYPE).unwrap(), "multipart/form-data; boundary=inbound");

    let entry = Entry::default().post(echo).unwrap();
    let seen = json_body(entry.invoke(request()).unwrap());
    assert_eq!(seen["content_type"], "multipart/form-data; boundary=inbound");
    let body = seen["body"].as_str().unwrap();
    assert!(body.starts_with("--inbound\r\n"));
    assert!(body.contains("name=\"name\"\r\n\r\na\r\n"));
    assert!(body.contains("name=\"f\"; filename=\"x.txt\""));
    assert!(body.contains("Content-Type: text/plain\r\n\r\nfile body\r\n"));
    assert!(body.ends_with("--inbound--\r\n"));
}

#[test]
fn form_without_files_is_urlencoded() {
    init_tracing();
    let request = || {
        HostRequest::new("POST", "http://fn.local/")
            .header("Content-Type", "application/json")
            .form("name", "a")
    };

    let normalized = to_normalized_request(request()).unwrap();
    assert_eq!(normalized.header(&CONTENT_TYPE).unwrap(), URLENCODED);

    let entry = Entry::default().post(echo).unwrap();
    let seen = json_body(entry.invoke(request()).unwrap());
    assert_eq!(seen, json!({ "content_type": URLENCODED, "body": "name=a" }));
}

#[test]
fn streamed_chunks_arrive_in_order_after_the_head() {
    init_tracing();
    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(go_rx)));

    let endpoint = move |_req: Request| {
        let gate = gate.lock().unwrap().take();
        async move {
            let chunks = stream::once(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
            })
            .flat_map(|()| stream::iter(["a", "b", "c"].map(|c| Ok::<_, Error>(Bytes::from_static(c.as_bytes())))));
            Response::builder()
                .status(StatusCode::ACCEPTED)
                .stream(ContentType::Text, AsyncByteStream::from_stream(chunks))
        }
    };
    let entry = Entry::default().get(endpoint).unwrap();

    let response = entry.invoke(HostRequest::new("GET", "http://fn.local/")).unwrap();
    // No chunk can have been produced yet: the gate is still closed.
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.content_type().unwrap(), "text/plain; charset=utf-8");
    go_tx.send(()).unwrap();

    let mut body = response.into_body();
    let chunks: Vec<Bytes> = body.by_ref().map(Result::unwrap).collect();
    assert_eq!(chunks, ["a", "b", "c"]);
    assert!(body.next().is_none());
    assert!(body.is_closed());
}

#[test]
fn second_mount_fails_and_first_keeps_serving() {
    init_tracing();
    async fn first(_req: Request) -> &'static str { "first" }
    async fn second(_req: Request) -> &'static str { "second" }

    let bridge = Arc::new(Bridge::default());
    let entry = Entry::on(Arc::clone(&bridge)).get(first).unwrap();

    let err = bridge.mount(second, vec![], Some(vec![Method::GET])).unwrap_err();
    assert!(matches!(err, Error::AlreadyMounted));
    assert_eq!(err.to_string(), "entry point is already mounted");

    let response = entry.invoke(HostRequest::new("GET", "http://fn.local/")).unwrap();
    assert_eq!(response.into_body().collect_bytes().unwrap(), "first");
}

// ── Properties ────────────────────────────────────────────────────────────────

#[test]
fn parsed_form_wins_over_raw_body() {
    let request = HostRequest::new("POST", "http://fn.local/")
        .data("raw=ignored")
        .form("name", "a")
        .form("name", "b");
    let normalized = to_normalized_request(request).unwrap();
    assert_eq!(normalized.body, RequestBody::Form(vec![
        ("name".to_owned(), "a".to_owned()),
        ("name".to_owned(), "b".to_owned()),
    ]));
}

#[rstest]
#[case::get("GET")]
#[case::post("POST")]
#[case::put("PUT")]
fn empty_body_drops_inbound_content_length(#[case] method: &str) {
    let request = HostRequest::new(method, "http://fn.local/").header("Content-Length", "17");
    let normalized = to_normalized_request(request).unwrap();
    assert_eq!(normalized.body, RequestBody::Empty);
    assert!(normalized.header(&CONTENT_LENGTH).is_none());
}

#[rstest]
#[case::json("application/json")]
#[case::text("text/plain")]
#[case::multipart("multipart/form-data; boundary=x")]
fn form_fields_force_urlencoded(#[case] declared: &str) {
    let request = HostRequest::new("POST", "http://fn.local/")
        .header("content-type", declared)
        .form("k", "v");
    let normalized = to_normalized_request(request).unwrap();
    let content_types: Vec<_> = normalized.headers.iter().filter(|(k, _)| *k == CONTENT_TYPE).collect();
    assert_eq!(content_types.len(), 1);
    assert_eq!(content_types[0].1, URLENCODED);
}

#[rstest]
#[case::single(vec!["payload"])]
#[case::many(vec!["h", "e", "l", "l", "o"])]
#[case::with_empty(vec!["a", "", "b"])]
#[case::none(vec![])]
#[case::large(vec!["x"; 200])]
fn response_body_is_relayed_unmodified(#[case] parts: Vec<&'static str>) {
    let expected: String = parts.concat();
    let endpoint = move |_req: Request| {
        let parts = parts.clone();
        async move {
            let chunks = stream::iter(parts).map(|p| Ok::<_, Error>(Bytes::from_static(p.as_bytes())));
            Response::builder().stream(ContentType::OctetStream, AsyncByteStream::from_stream(chunks))
        }
    };
    let entry = Entry::default().get(endpoint).unwrap();

    let body = entry.invoke(HostRequest::new("GET", "http://fn.local/")).unwrap().into_body();
    let chunks: Vec<Bytes> = body.map(Result::unwrap).collect();
    assert!(chunks.iter().all(|c| !c.is_empty()));
    assert_eq!(chunks.concat(), expected.as_bytes());
}

#[test]
fn random_chunkings_are_relayed_unmodified() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..20 {
        let parts: Vec<Vec<u8>> = (0..rng.usize(0..12))
            .map(|_| (0..rng.usize(0..64)).map(|_| rng.u8(..)).collect())
            .collect();
        let expected = parts.concat();

        let bridge = Bridge::default();
        let endpoint = move |_req: Request| {
            let parts = parts.clone();
            async move {
                let chunks = stream::iter(parts).map(|p| Ok::<_, Error>(Bytes::from(p)));
                Response::builder().stream(ContentType::OctetStream, AsyncByteStream::from_stream(chunks))
            }
        };
        bridge.mount(endpoint, vec![], None).unwrap();

        let body = bridge.proxy(HostRequest::new("GET", "http://fn.local/")).unwrap().into_body();
        assert_eq!(body.collect_bytes().unwrap(), expected);
    }
}

#[tokio::test]
async fn async_hosts_await_the_body() {
    let bridge = Bridge::default();
    bridge.mount(echo, vec![], Some(vec![Method::PUT])).unwrap();

    let request = HostRequest::new("PUT", "http://fn.local/")
        .header("content-type", "application/json")
        .data(r#"{"a":1}"#);
    let response = bridge.proxy_async(request).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let body = response.body.collect_bytes().await.unwrap();
    let seen: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(seen, json!({ "content_type": "application/json", "body": r#"{"a":1}"# }));
}

#[test]
fn raw_body_with_files_is_rejected() {
    let bridge = Bridge::default();
    bridge.mount(echo, vec![], Some(vec![Method::POST])).unwrap();
    let request = HostRequest::new("POST", "http://fn.local/")
        .data("raw")
        .file(UploadedFile::new("f", SyncByteStream::empty()));
    assert!(matches!(bridge.proxy(request), Err(Error::InvalidRequest(_))));
}

#[test]
fn failing_upload_surfaces_as_body_error() {
    let bridge = Bridge::default();
    bridge.mount(echo, vec![], Some(vec![Method::POST])).unwrap();
    let upload = UploadedFile::new("f", SyncByteStream::from_iter([
        Ok(Bytes::from_static(b"partial")),
        Err(Error::Body("disk gone".into())),
    ]));
    let request = HostRequest::new("POST", "http://fn.local/")
        .form("name", "a")
        .file(upload);

    let err = bridge.proxy(request).unwrap_err();
    assert!(matches!(err, Error::Body(_)));
    assert_eq!(err.to_string(), "disk gone");
}

// ── Abandoned bodies ──────────────────────────────────────────────────────────

/// Set when the endpoint's body stream is dropped.
struct Released(Arc<AtomicBool>);

impl Drop for Released {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// An entry point whose body never ends, counting how often it is polled.
fn endless_entry(released: Arc<AtomicBool>, polls: Arc<AtomicUsize>) -> fnbridge::EntryPoint {
    let endpoint = move |_req: Request| {
        let released = Arc::clone(&released);
        let polls = Arc::clone(&polls);
        async move {
            let guard = Released(released);
            let ticks = stream::unfold(guard, move |guard| {
                let polls = Arc::clone(&polls);
                async move {
                    polls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Some((Ok::<_, Error>(Bytes::from_static(b"tick")), guard))
                }
            });
            Response::builder().stream(ContentType::OctetStream, AsyncByteStream::from_stream(ticks))
        }
    };
    Entry::default().get(endpoint).unwrap()
}

fn abandon_after_one_chunk() {
    let released = Arc::new(AtomicBool::new(false));
    let polls = Arc::new(AtomicUsize::new(0));
    let entry = endless_entry(Arc::clone(&released), Arc::clone(&polls));

    let mut response = entry.invoke(HostRequest::new("GET", "http://fn.local/")).unwrap();
    assert_eq!(response.body_mut().next().unwrap().unwrap(), "tick");
    assert!(!released.load(Ordering::SeqCst));

    let polls_before = polls.load(Ordering::SeqCst);
    drop(response);
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(polls.load(Ordering::SeqCst), polls_before);
}

#[test]
fn dropping_the_body_stops_the_endpoint() {
    abandon_after_one_chunk();
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_body_stops_the_endpoint_inside_a_runtime() {
    abandon_after_one_chunk();
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_streaming_uses_one_driver_thread() {
    let seen: Arc<Mutex<Vec<ThreadId>>> = Arc::default();
    let recorder = Arc::clone(&seen);
    let endpoint = move |_req: Request| {
        let recorder = Arc::clone(&recorder);
        async move {
            let chunks = stream::iter(0..20u8).then(move |i| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(thread::current().id());
                    tokio::task::yield_now().await;
                    Ok::<_, Error>(Bytes::from(vec![i]))
                }
            });
            Response::builder().stream(ContentType::OctetStream, AsyncByteStream::from_stream(chunks))
        }
    };
    let entry = Entry::default().get(endpoint).unwrap();

    let body = entry.invoke(HostRequest::new("GET", "http://fn.local/")).unwrap().into_body();
    assert_eq!(body.collect_bytes().unwrap(), (0..20u8).collect::<Vec<_>>());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 20);
    let drivers: HashSet<_> = seen.iter().collect();
    assert_eq!(drivers.len(), 1);
    assert!(!drivers.contains(&thread::current().id()));
}
