use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

#[derive(Debug, Clone, Default)]
pub struct CatalogStubConfig {
    /// `(eisbn, title)` in catalog order.
    pub books: Vec<(String, String)>,
    /// Interior page keys per eisbn.
    pub interiors: HashMap<String, Vec<String>>,
    /// Advertised `max_offset`; defaults to the number of books.
    pub max_offset: Option<u64>,
    /// Answer the first browse at this offset with 401.
    pub reject_browse_once_at: Option<u64>,
    /// Image requests whose `b` parameter matches fail with 500.
    pub broken_image_books: Vec<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

pub struct CatalogStub {
    pub api_base: String,
    pub cdn_base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl CatalogStub {
    pub fn spawn(config: CatalogStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start catalog stub server");
        let addr = server.server_addr();
        let api_base = format!("http://{addr}/customer");
        let cdn_base = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut sessions = 0_usize;
            let mut rejected = false;
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let raw_url = request.url().to_string();
                let (path, query) = match raw_url.split_once('?') {
                    Some((path, query)) => (path.to_owned(), parse_pairs(query)),
                    None => (raw_url.clone(), HashMap::new()),
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let form = parse_pairs(&body);

                recorded.lock().expect("lock requests").push(RecordedRequest {
                    path: path.clone(),
                    query: query.clone(),
                    form: form.clone(),
                });

                let (status, body): (u16, Value) = match path.as_str() {
                    "/customer/session/get" => {
                        sessions += 1;
                        (200, json!({ "session_id": format!("stub-session-{sessions}") }))
                    }
                    "/customer/browse/get" => {
                        let number = |key: &str| form.get(key).and_then(|v| v.parse::<u64>().ok());
                        let offset = number("o").unwrap_or(0);
                        let limit = number("l").unwrap_or(100);
                        if config.reject_browse_once_at == Some(offset) && !rejected {
                            rejected = true;
                            (401, json!({ "error": "session expired" }))
                        } else {
                            let rows = config
                                .books
                                .iter()
                                .skip(offset as usize)
                                .take(limit as usize)
                                .map(|(id, title)| {
                                    json!({
                                        "eisbn": id,
                                        "title": title,
                                        "author": "Stub Author",
                                        "price": 9.99,
                                        "cover_image_cache": 1700000000,
                                    })
                                })
                                .collect::<Vec<_>>();
                            let max_offset = config.max_offset.unwrap_or(config.books.len() as u64);
                            (200, json!({ "rows": rows, "max_offset": max_offset }))
                        }
                    }
                    "/customer/title/getItem" => {
                        let id = form.get("eisbn").cloned().unwrap_or_default();
                        let objects = config
                            .interiors
                            .get(&id)
                            .map(|keys| {
                                keys.iter()
                                    .map(|key| json!({ "key": key, "cb": 5 }))
                                    .collect::<Vec<_>>()
                            })
                            .unwrap_or_default();
                        (200, json!({ "interior_objects": objects }))
                    }
                    "/i/m" => {
                        let id = query.get("b").cloned().unwrap_or_default();
                        if config.broken_image_books.contains(&id) {
                            let _ = request.respond(
                                tiny_http::Response::from_string("broken").with_status_code(500),
                            );
                        } else {
                            let jpeg = b"\xff\xd8\xff\xe0stub-jpeg".to_vec();
                            let response = tiny_http::Response::from_data(jpeg);
                            let _ = request.respond(response.with_status_code(200));
                        }
                        continue;
                    }
                    _ => (404, json!({ "error": "not found" })),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(body.to_string())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            api_base,
            cdn_base,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    pub fn browse_offsets(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == "/customer/browse/get")
            .map(|r| r.form.get("o").cloned().unwrap_or_default())
            .collect()
    }
}

impl Drop for CatalogStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn parse_pairs(input: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[allow(dead_code)]
pub fn numbered_books(count: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|i| (format!("97800000{i:05}"), format!("Stub Book {i}")))
        .collect()
}
