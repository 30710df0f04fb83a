//! Requests against the remote ingest API.

use super::transport::{Method, Request, Transport};
use crate::error::Error;
use crate::metric::{Payload, Series};
use std::sync::Arc;
use std::time::Duration;

/// Endpoints and credentials of the remote API, bound to a transport.
#[derive(Clone)]
pub struct Api {
    transport: Arc<dyn Transport>,
    base: String,
    logs_base: String,
    api_key: String,
    app_key: Option<String>,
}

#[derive(Serialize)]
struct HostTags<'a> {
    tags: &'a [String],
}

impl Api {
    /// Bind `transport` to the API rooted at `base`. Logs go to `logs_base`,
    /// or to `base` if none is given.
    pub fn new<S>(
        transport: Arc<dyn Transport>,
        base: S,
        logs_base: Option<String>,
        api_key: S,
        app_key: Option<String>,
    ) -> Api
    where
        S: Into<String>,
    {
        let base = base.into().trim_end_matches('/').to_string();
        let logs_base = logs_base
            .map(|l| l.trim_end_matches('/').to_string())
            .unwrap_or_else(|| base.clone());
        Api {
            transport: transport,
            base: base,
            logs_base: logs_base,
            api_key: api_key.into(),
            app_key: app_key,
        }
    }

    fn check(&self, what: &str, status: u16) -> Result<(), Error> {
        if status >= 300 {
            Err(Error::UplinkTransient(format!(
                "{} answered with status {}",
                what, status
            )))
        } else {
            Ok(())
        }
    }

    /// POST `series` as one JSON payload. Returns the payload size in bytes.
    pub fn send_series(&self, series: &[Series], timeout: Duration) -> Result<usize, Error> {
        let body = serde_json::to_vec(&Payload { series: series })?;
        let bytes = body.len();
        let status = self.transport.send(Request {
            method: Method::Post,
            url: format!("{}/api/v1/series?api_key={}", self.base, self.api_key),
            content_type: "application/json",
            body: body,
            timeout: timeout,
        })?;
        self.check("series endpoint", status)?;
        Ok(bytes)
    }

    /// POST raw, newline separated log output.
    pub fn send_logs(&self, lines: &[u8], timeout: Duration) -> Result<usize, Error> {
        let status = self.transport.send(Request {
            method: Method::Post,
            url: format!("{}/api/v1/logs?api_key={}", self.logs_base, self.api_key),
            content_type: "text/plain",
            body: lines.to_vec(),
            timeout: timeout,
        })?;
        self.check("logs endpoint", status)?;
        Ok(lines.len())
    }

    /// Replace the host-level tags of `host`. Requires an application key.
    pub fn update_host_tags(
        &self,
        host: &str,
        tags: &[String],
        timeout: Duration,
    ) -> Result<(), Error> {
        let app_key = match self.app_key {
            Some(ref key) => key,
            None => return Err(Error::OptionMissing("app-key".to_string())),
        };
        let body = serde_json::to_vec(&HostTags { tags: tags })?;
        let status = self.transport.send(Request {
            method: Method::Put,
            url: format!(
                "{}/api/v1/tags/hosts/{}?api_key={}&application_key={}",
                self.base, host, self.api_key, app_key
            ),
            content_type: "application/json",
            body: body,
            timeout: timeout,
        })?;
        self.check("host tags endpoint", status)
    }
}

#[cfg(test)]
pub mod test {
    //! A recording in-memory transport for tests.

    use super::*;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed status.
    pub struct Recorder {
        pub status: Mutex<Result<u16, String>>,
        pub requests: Mutex<Vec<Request>>,
    }

    impl Recorder {
        pub fn new(status: u16) -> Arc<Recorder> {
            Arc::new(Recorder {
                status: Mutex::new(Ok(status)),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn set_status(&self, status: Result<u16, String>) {
            *self.status.lock().unwrap() = status;
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for Recorder {
        fn send(&self, request: Request) -> Result<u16, Error> {
            self.requests.lock().unwrap().push(request);
            self.status
                .lock()
                .unwrap()
                .clone()
                .map_err(Error::UplinkTransient)
        }
    }

    pub fn api(recorder: &Arc<Recorder>) -> Api {
        Api::new(
            Arc::clone(recorder) as Arc<dyn Transport>,
            "https://api.example.com/",
            None,
            "k3y",
            Some("app".to_string()),
        )
    }
}
