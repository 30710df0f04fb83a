//! The HTTP seam between the uplink and the network.

use crate::error::Error;
use reqwest;
use std::fmt;
use std::time::Duration;

/// The HTTP methods the remote API needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Submissions.
    Post,
    /// Host tag updates.
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Method::Post => f.write_str("POST"),
            Method::Put => f.write_str("PUT"),
        }
    }
}

/// A fully formed request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Method to use.
    pub method: Method,
    /// Absolute URL, query string included.
    pub url: String,
    /// Value of the Content-Type header.
    pub content_type: &'static str,
    /// Request body.
    pub body: Vec<u8>,
    /// Upper bound on the whole exchange.
    pub timeout: Duration,
}

/// Anything that can carry a `Request` and report the response status.
///
/// Network failures are `Err`. Any response, whatever its status, is `Ok`.
pub trait Transport: Send + Sync {
    /// Perform the request, blocking until a response or the timeout.
    fn send(&self, request: Request) -> Result<u16, Error>;
}

/// `Transport` over a blocking reqwest client.
pub struct Http {
    client: reqwest::blocking::Client,
}

impl Http {
    /// Build the client. With `insecure` set TLS certificates are not
    /// verified.
    pub fn new(insecure: bool) -> Result<Http, Error> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| Error::ConfigInvalid(format!("http client: {}", e)))?;
        Ok(Http { client: client })
    }
}

impl Transport for Http {
    fn send(&self, request: Request) -> Result<u16, Error> {
        let builder = match request.method {
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        };
        let response = builder
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .timeout(request.timeout)
            .body(request.body)
            .send()?;
        Ok(response.status().as_u16())
    }
}
