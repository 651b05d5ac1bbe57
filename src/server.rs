//! HTTP front end. Routing is a pure function over [`AppContext`] so it can be driven without
//! sockets; [`serve`] only adapts `tiny_http` requests onto it.

use std::io::Read;

use crate::device::image::Image;
use crate::foundation::error::{SenseHatError, SenseHatResult};
use crate::service::DisplayService;
use crate::storage::Storage;

/// Largest request body accepted by the listener.
pub const MAX_BODY_BYTES: u64 = 1 << 20;

/// Everything a request handler needs.
pub struct AppContext {
    pub service: DisplayService,
    pub storage: Storage,
}

impl AppContext {
    pub fn new(service: DisplayService, storage: Storage) -> Self {
        Self { service, storage }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn ok() -> Self {
        Self::new(200, "OK")
    }
}

/// Dispatch one request. `path` may carry a query string and a trailing `/`.
pub fn route(ctx: &AppContext, method: &str, path: &str, body: &[u8]) -> Reply {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let path = match path.strip_suffix('/') {
        Some(p) if !p.is_empty() => p,
        _ => path,
    };

    let allowed = match path {
        "/" => "GET",
        "/cancel" | "/clear" | "/show" => "POST",
        p if p.starts_with("/play/") => "POST",
        _ => return Reply::new(404, "not found"),
    };
    if !method.eq_ignore_ascii_case(allowed) {
        return Reply::new(405, "method not allowed");
    }

    match path {
        "/" => Reply::new(200, "Sense Hat API"),
        "/cancel" => {
            ctx.service.cancel();
            Reply::ok()
        }
        "/clear" => submitted(ctx.service.clear()),
        "/show" => show(ctx, body),
        p => match percent_decode(&p["/play/".len()..]) {
            Some(key) => play(ctx, &key),
            None => Reply::new(400, "malformed percent-encoding in movie key"),
        },
    }
}

/// Decode `%XX` escapes in a path segment. `None` on a bad escape or non-UTF-8 result.
fn percent_decode(raw: &str) -> Option<String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.bytes();
    while let Some(b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        let hi = (bytes.next()? as char).to_digit(16)?;
        let lo = (bytes.next()? as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    String::from_utf8(out).ok()
}

fn submitted<T>(res: SenseHatResult<T>) -> Reply {
    match res {
        Ok(_) => Reply::ok(),
        Err(e) => {
            tracing::error!(error = %e, "submission rejected");
            Reply::new(503, e.to_string())
        }
    }
}

fn play(ctx: &AppContext, key: &str) -> Reply {
    match ctx.storage.load_movie(key, ctx.service.pool()) {
        Ok(Some(movie)) => submitted(ctx.service.play(movie)),
        Ok(None) => Reply::new(404, format!("no movie stored under '{key}'")),
        Err(e @ (SenseHatError::Storage(_) | SenseHatError::Malformed(_))) => {
            Reply::new(400, e.to_string())
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "movie unreadable");
            Reply::new(404, e.to_string())
        }
    }
}

fn show(ctx: &AppContext, body: &[u8]) -> Reply {
    let rows: Vec<Vec<String>> = match serde_json::from_slice(body) {
        Ok(rows) => rows,
        Err(e) => return Reply::new(400, format!("expected a JSON array of color rows: {e}")),
    };
    let format = ctx.service.config().format;
    match Image::from_hex_grid(ctx.service.pool(), format, &rows) {
        Ok(image) => submitted(ctx.service.show(image)),
        Err(e) => Reply::new(400, e.to_string()),
    }
}

/// Accept requests on `listen` until the listener fails.
pub fn serve(listen: &str, ctx: &AppContext) -> SenseHatResult<()> {
    let server = tiny_http::Server::http(listen)
        .map_err(|e| SenseHatError::validation(format!("bind '{listen}': {e}")))?;
    tracing::info!(listen, "listening");

    for mut request in server.incoming_requests() {
        let method = request.method().to_string();
        let url = request.url().to_string();

        let mut body = Vec::new();
        let reply = match request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
        {
            Ok(_) => route(ctx, &method, &url, &body),
            Err(e) => Reply::new(400, format!("read body: {e}")),
        };

        tracing::info!(method = %method, path = %url, status = reply.status, "request");
        let response = tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
        if let Err(e) = request.respond(response) {
            tracing::warn!(path = %url, error = %e, "failed to send response");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::movie::Movie;
    use crate::device::sink::InMemorySink;
    use crate::schedule::scheduler::JobStatus;
    use crate::service::DisplayConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "sensehat_server_{name}_{}_{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ctx(name: &str) -> (AppContext, InMemorySink, PathBuf) {
        let sink = InMemorySink::new();
        let service =
            DisplayService::new(DisplayConfig::default(), Box::new(sink.clone())).unwrap();
        let dir = temp_dir(name);
        (AppContext::new(service, Storage::new(&dir)), sink, dir)
    }

    fn settle(ctx: &AppContext) {
        if let Some(h) = ctx.service.current() {
            h.wait_timeout(Duration::from_secs(10)).unwrap();
        }
    }

    #[test]
    fn root_and_unknown_paths() {
        let (ctx, _, _) = ctx("root");
        assert_eq!(route(&ctx, "GET", "/", b""), Reply::new(200, "Sense Hat API"));
        assert_eq!(route(&ctx, "GET", "/nope", b"").status, 404);
        assert_eq!(route(&ctx, "POST", "/", b"").status, 405);
        assert_eq!(route(&ctx, "GET", "/clear", b"").status, 405);
    }

    #[test]
    fn clear_and_cancel_tolerate_trailing_slash() {
        let (ctx, sink, _) = ctx("clear");
        assert_eq!(route(&ctx, "POST", "/cancel/", b"").status, 200);
        assert_eq!(route(&ctx, "POST", "/clear/", b"").status, 200);
        settle(&ctx);
        assert_eq!(sink.write_count(), 1);
    }

    #[test]
    fn play_statuses() {
        let (ctx, sink, dir) = ctx("play");
        let mut m = Movie::new(8, 8, 1).unwrap();
        m.set_wait(0, Duration::from_millis(1)).unwrap();
        m.save_to_path(dir.join("one.bin")).unwrap();
        std::fs::write(dir.join("bad.bin"), [0xFF, 0xFF, 0xFF, 0xFF, 8, 8, 0, 0]).unwrap();

        assert_eq!(route(&ctx, "POST", "/play/missing.bin", b"").status, 404);
        assert_eq!(route(&ctx, "POST", "/play/../secret", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/bad.bin", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/one.bin/", b"").status, 200);

        let h = ctx.service.current().unwrap();
        assert_eq!(h.wait_timeout(Duration::from_secs(10)), Some(JobStatus::Completed));
        assert_eq!(sink.write_count(), 1);
    }

    #[test]
    fn play_keys_are_percent_decoded() {
        let (ctx, sink, dir) = ctx("play_decode");
        let mut m = Movie::new(8, 8, 1).unwrap();
        m.set_wait(0, Duration::from_millis(1)).unwrap();
        m.save_to_path(dir.join("my clip.bin")).unwrap();
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        m.save_to_path(dir.join("sub").join("caf\u{e9}.bin")).unwrap();

        assert_eq!(route(&ctx, "POST", "/play/my%20clip.bin", b"").status, 200);
        settle(&ctx);
        assert_eq!(route(&ctx, "POST", "/play/sub%2Fcaf%C3%A9.bin", b"").status, 200);
        settle(&ctx);
        assert_eq!(sink.write_count(), 2);

        assert_eq!(route(&ctx, "POST", "/play/%2e%2e/x", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/sub/%2E%2E/%2e%2e/x", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/bad%zz", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/trunc%2", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/%FF.bin", b"").status, 400);
        assert_eq!(route(&ctx, "POST", "/play/my%2520clip.bin", b"").status, 404);
        assert_eq!(sink.write_count(), 2);
    }

    #[test]
    fn percent_decode_handles_escapes() {
        assert_eq!(percent_decode("a%20b").as_deref(), Some("a b"));
        assert_eq!(percent_decode("plain.bin").as_deref(), Some("plain.bin"));
        assert_eq!(percent_decode("%2e%2E").as_deref(), Some(".."));
        assert_eq!(percent_decode("%"), None);
        assert_eq!(percent_decode("%g0"), None);
    }

    #[test]
    fn show_parses_grid_and_rejects_bad_bodies() {
        let (ctx, sink, _) = ctx("show");
        assert_eq!(route(&ctx, "POST", "/show", b"not json").status, 400);
        assert_eq!(route(&ctx, "POST", "/show", br#"{"a": 1}"#).status, 400);
        assert_eq!(route(&ctx, "POST", "/show", br#"[[1, 2]]"#).status, 400);
        assert_eq!(sink.write_count(), 0);

        let body = br##"[["#FF0000", "garbage"], ["00FF00"]]"##;
        assert_eq!(route(&ctx, "POST", "/show", body).status, 200);
        settle(&ctx);
        assert_eq!(
            sink.writes()[0].0,
            vec![0x00, 0xF8, 0x00, 0x00, 0xE0, 0x07, 0x00, 0x00]
        );
    }
}
