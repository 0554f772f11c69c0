#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use kira_ortholog_mapper::client::{ApiClient, HttpReply, RetryPolicy, Transport};
use kira_ortholog_mapper::error::OrthoError;
use kira_ortholog_mapper::throttle::RateLimiter;

pub const KEGG: &str = "http://kegg.test";
pub const SSDB: &str = "http://ssdb.test";

#[derive(Clone)]
enum Scripted {
    Reply(u16, String),
    Fail(String),
}

/// Replies per URL in the order queued; the last reply for a URL repeats.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: &str, status: u16, body: &str) -> &Self {
        self.push(url, Scripted::Reply(status, body.to_string()))
    }

    pub fn ok(&self, url: &str, body: &str) -> &Self {
        self.reply(url, 200, body)
    }

    /// Drops anything still queued for `url` before scripting the new reply.
    pub fn replace(&self, url: &str, status: u16, body: &str) -> &Self {
        self.routes.lock().unwrap().remove(url);
        self.reply(url, status, body)
    }

    pub fn fail(&self, url: &str, message: &str) -> &Self {
        self.push(url, Scripted::Fail(message.to_string()))
    }

    fn push(&self, url: &str, reply: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, OrthoError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        let next = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match next {
            Some(Scripted::Reply(status, body)) => Ok(HttpReply { status, body }),
            Some(Scripted::Fail(message)) => Err(OrthoError::Http(message)),
            None => Ok(HttpReply {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

pub fn client(transport: Arc<ScriptedTransport>, requests_per_second: u32) -> ApiClient {
    ApiClient::new(
        transport,
        Arc::new(RateLimiter::per_second(requests_per_second)),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        },
    )
}

pub fn kegg(path: &str) -> String {
    format!("{KEGG}{path}")
}

pub fn ssdb(gene: &str) -> String {
    format!("{SSDB}/ssdb/ortholog/{gene}")
}
