//! Local HTTP listener for the OAuth redirect

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::{Context, Result};
use log::{debug, warn};
use url::Url;

/// What a request to the local listener asks for
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    /// Redirect with an authorization code
    Code(String),
    /// Redirect where the user denied access
    Denied(String),
    /// Redirect path without a code
    MissingCode,
    /// Anything else (favicon requests and the like)
    NotFound,
}

/// Classify a request target such as `/callback?code=abc`
pub fn route(target: &str, redirect_path: &str) -> Route {
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        return Route::NotFound;
    };
    if url.path() != redirect_path {
        return Route::NotFound;
    }

    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    };

    if let Some(code) = param("code") {
        Route::Code(code)
    } else if let Some(error) = param("error") {
        Route::Denied(error)
    } else {
        Route::MissingCode
    }
}

/// Serve redirects until one carries a code, then hand it to `exchange`
///
/// Requests for other paths get a 404 and a redirect without a code gets a
/// 400; both keep the listener running. The browser sees a 500 if `exchange`
/// fails.
pub fn serve<F>(listener: &TcpListener, redirect_path: &str, mut exchange: F) -> Result<()>
where
    F: FnMut(&str) -> raindrop::Result<()>,
{
    loop {
        let (mut stream, peer) = listener.accept().context("Failed to accept connection")?;
        let target = match read_request_target(&stream) {
            Ok(target) => target,
            Err(e) => {
                warn!("Ignoring unreadable request from {}: {:#}", peer, e);
                continue;
            }
        };
        debug!("Callback request: {}", target);

        match route(&target, redirect_path) {
            Route::Code(code) => match exchange(&code) {
                Ok(()) => {
                    respond(
                        &mut stream,
                        "200 OK",
                        "Authentication successful! You can close this tab and run: raindrop-sync fetch",
                    );
                    return Ok(());
                }
                Err(e) => {
                    respond(&mut stream, "500 Internal Server Error", &format!("Error: {}", e));
                    return Err(e.into());
                }
            },
            Route::Denied(error) => {
                respond(&mut stream, "400 Bad Request", "Authentication was denied.");
                anyhow::bail!("OAuth error: {}", error);
            }
            Route::MissingCode => {
                respond(&mut stream, "400 Bad Request", "Error: No authorization code received");
            }
            Route::NotFound => respond(&mut stream, "404 Not Found", "404 Not Found"),
        }
    }
}

/// Read the request line and drain the headers
///
/// Format: GET /callback?code=AUTH_CODE HTTP/1.1
fn read_request_target(stream: &TcpStream) -> Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .context("Failed to read request")?;

    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).context("Failed to read headers")?;
        if read == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    request_line
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .context("Malformed request line")
}

fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!("<html><body><h1>{}</h1></body></html>", message);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        warn!("Failed to answer callback request: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;

    #[test]
    fn test_route() {
        assert_eq!(
            route("/callback?code=abc&state=xyz", "/callback"),
            Route::Code("abc".to_string())
        );
        assert_eq!(
            route("/callback?code=a%2Bb", "/callback"),
            Route::Code("a+b".to_string())
        );
        assert_eq!(route("/callback", "/callback"), Route::MissingCode);
        assert_eq!(route("/callback?code=", "/callback"), Route::MissingCode);
        assert_eq!(
            route("/callback?error=access_denied", "/callback"),
            Route::Denied("access_denied".to_string())
        );
        assert_eq!(route("/favicon.ico", "/callback"), Route::NotFound);
        assert_eq!(route("/", "/callback"), Route::NotFound);
    }

    fn request(addr: std::net::SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_serve_until_code() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            vec![
                request(addr, "/favicon.ico"),
                request(addr, "/callback"),
                request(addr, "/callback?code=abc"),
            ]
        });

        let mut codes = Vec::new();
        serve(&listener, "/callback", |code| {
            codes.push(code.to_string());
            Ok(())
        })
        .unwrap();

        let responses = client.join().unwrap();
        assert!(responses[0].starts_with("HTTP/1.1 404"));
        assert!(responses[1].starts_with("HTTP/1.1 400"));
        assert!(responses[2].starts_with("HTTP/1.1 200"));
        assert_eq!(codes, vec!["abc".to_string()]);
    }

    #[test]
    fn test_serve_exchange_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || request(addr, "/callback?code=bad"));

        let result = serve(&listener, "/callback", |_| {
            Err(raindrop::Error::authentication("invalid_grant"))
        });

        assert!(result.is_err());
        assert!(client.join().unwrap().starts_with("HTTP/1.1 500"));
    }
}
