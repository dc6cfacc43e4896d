//! Test doubles shared by the interceptor and lifecycle tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use offcache_core::{Error, HttpResponse, RequestIdentity};

use crate::fetch::Fetcher;

#[derive(Clone)]
pub(crate) enum Outcome {
    Ok(HttpResponse),
    Status(u16),
    Offline,
    /// Never completes.
    Hang,
}

/// Fetcher answering from a per-URL script, counting every call.
///
/// URLs without a script entry answer as if the network were down.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    script: Mutex<HashMap<String, Outcome>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, outcome: Outcome) {
        self.script.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub(crate) fn ok(&self, url: &str, body: &str) {
        self.respond(url, Outcome::Ok(text(body)));
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn text(body: &str) -> HttpResponse {
    HttpResponse::new(200, vec![("content-type".into(), "text/plain".into())], body.as_bytes().to_vec())
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, identity: &RequestIdentity) -> Result<HttpResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().unwrap().get(identity.url().as_str()).cloned();
        match outcome {
            Some(Outcome::Ok(response)) => Ok(response),
            Some(Outcome::Status(status)) => {
                Err(Error::OriginError(Box::new(HttpResponse::new(status, Vec::new(), b"origin error".to_vec()))))
            }
            Some(Outcome::Hang) => std::future::pending().await,
            Some(Outcome::Offline) | None => Err(Error::NetworkUnavailable(format!("{identity}: offline"))),
        }
    }
}
