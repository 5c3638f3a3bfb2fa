//! Connectivity check for the configured outbound proxy.
//!
//! Asks an IP echo service for the address it sees, going through the proxy,
//! so an operator can confirm requests really leave through it.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const IP_ECHO_ENDPOINT: &str = "https://api.ipify.org?format=json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyReport {
    pub proxy_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpEcho {
    ip: String,
}

/// `proxy` must already carry a scheme. Never fails; problems land in
/// [`ProxyReport::error`].
pub fn check_proxy(proxy: Option<&str>, endpoint: &str, timeout: Duration) -> ProxyReport {
    let Some(proxy) = proxy else {
        return ProxyReport {
            proxy_configured: false,
            exit_ip: None,
            error: None,
        };
    };

    match exit_ip(proxy, endpoint, timeout) {
        Ok(ip) => {
            info!(ip = %ip, "proxy reachable");
            ProxyReport {
                proxy_configured: true,
                exit_ip: Some(ip),
                error: None,
            }
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "proxy check failed");
            ProxyReport {
                proxy_configured: true,
                exit_ip: None,
                error: Some(format!("{err:#}")),
            }
        }
    }
}

fn exit_ip(proxy: &str, endpoint: &str, timeout: Duration) -> Result<String> {
    let proxy = ureq::Proxy::new(proxy).context("parsing proxy address")?;
    let agent = ureq::AgentBuilder::new()
        .timeout(timeout)
        .proxy(proxy)
        .build();
    let echo: IpEcho = agent
        .get(endpoint)
        .call()
        .with_context(|| format!("requesting {endpoint} through proxy"))?
        .into_json()
        .context("decoding IP echo response")?;
    Ok(echo.ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn read_head(stream: &mut TcpStream) -> Result<String> {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte)? == 0 {
                break;
            }
            head.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&head).into_owned())
    }

    /// Minimal HTTP proxy answering one request, tunnelled or not, with `body`.
    fn fake_proxy(body: &'static str) -> Result<(String, thread::JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let handle = thread::spawn(move || -> Result<()> {
            let (mut stream, _) = listener.accept()?;
            let mut head = read_head(&mut stream)?;
            if head.starts_with("CONNECT") {
                stream.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")?;
                head = read_head(&mut stream)?;
            }
            assert!(head.starts_with("GET "), "{head}");
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )?;
            Ok(())
        });
        Ok((format!("http://{addr}"), handle))
    }

    #[test]
    fn no_proxy_means_nothing_to_check() {
        let report = check_proxy(None, IP_ECHO_ENDPOINT, Duration::from_secs(1));
        assert!(!report.proxy_configured);
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"proxyConfigured":false}"#
        );
    }

    #[test]
    fn reports_exit_ip_seen_through_proxy() -> Result<()> {
        let (proxy, server) = fake_proxy(r#"{"ip":"203.0.113.7"}"#)?;
        let report = check_proxy(
            Some(&proxy),
            "http://ip.test/?format=json",
            Duration::from_secs(5),
        );
        assert_eq!(report.error, None);
        assert_eq!(report.exit_ip.as_deref(), Some("203.0.113.7"));
        server.join().expect("proxy thread")?;
        Ok(())
    }

    #[test]
    fn unreachable_proxy_is_reported_not_raised() -> Result<()> {
        let addr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
        let report = check_proxy(
            Some(&format!("http://{addr}")),
            "http://ip.test/?format=json",
            Duration::from_secs(2),
        );
        assert!(report.proxy_configured);
        assert_eq!(report.exit_ip, None);
        assert!(report.error.is_some());
        Ok(())
    }
}
