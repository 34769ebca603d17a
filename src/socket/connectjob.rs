use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::proxy::ProxySettings;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

/// Upper bound on a proxy's CONNECT response head.
const MAX_TUNNEL_RESPONSE: usize = 8 * 1024;

/// Manages the connection process: DNS -> TCP -> proxy tunnel.
/// Roughly equivalent to net::ConnectJob, without TLS.
pub struct ConnectJob;

impl ConnectJob {
    /// Open a TCP stream that carries requests for `url`.
    ///
    /// With a proxy the stream is a CONNECT tunnel through it, so the
    /// caller speaks to the origin exactly as over a direct connection.
    pub async fn connect(url: &Url, proxy: Option<&ProxySettings>) -> Result<TcpStream, NetError> {
        let target_host = url.host_str().ok_or(NetError::InvalidUrl)?;
        let target_port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;

        let Some(proxy) = proxy else {
            return Self::connect_tcp(target_host, target_port).await;
        };

        let (proxy_host, proxy_port) = proxy.host_port().ok_or(NetError::InvalidUrl)?;
        let mut stream = Self::connect_tcp(proxy_host, proxy_port)
            .await
            .map_err(|e| {
                tracing::debug!(proxy = %proxy.url, error = %e, "proxy unreachable");
                NetError::ProxyConnectionFailed
            })?;
        Self::establish_tunnel(&mut stream, target_host, target_port, proxy).await?;
        Ok(stream)
    }

    async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, NetError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addrs = tokio::net::lookup_host((host, port)).await.dns_context(host)?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e).connection_context(host, port),
            None => Err(NetError::NameNotResolved),
        }
    }

    async fn establish_tunnel(
        stream: &mut TcpStream,
        host: &str,
        port: u16,
        proxy: &ProxySettings,
    ) -> Result<(), NetError> {
        let target = format!("{host}:{port}");
        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if let Some(auth) = proxy.auth_header() {
            request.push_str(&format!("Proxy-Authorization: {}\r\n", auth.as_str()));
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|_| NetError::TunnelConnectionFailed)?;

        // Read byte by byte so nothing past the response head is consumed.
        let mut head = Vec::with_capacity(256);
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if head.len() >= MAX_TUNNEL_RESPONSE {
                return Err(NetError::TunnelConnectionFailed);
            }
            let n = stream
                .read(&mut byte)
                .await
                .map_err(|_| NetError::TunnelConnectionFailed)?;
            if n == 0 {
                return Err(NetError::TunnelConnectionFailed);
            }
            head.push(byte[0]);
        }

        let status_line = head
            .split(|b| *b == b'\n')
            .next()
            .map(|l| String::from_utf8_lossy(l).trim().to_string())
            .unwrap_or_default();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok());

        match status {
            Some(200) => {
                tracing::debug!(proxy = %proxy.url, target = %target, "tunnel established");
                Ok(())
            }
            Some(407) => {
                tracing::debug!(proxy = %proxy.url, "proxy authentication required");
                Err(NetError::ProxyConnectionFailed)
            }
            _ => {
                tracing::debug!(proxy = %proxy.url, status = %status_line, "tunnel refused");
                Err(NetError::TunnelConnectionFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn read_head(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        while !buf.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).await.unwrap() == 0 {
                break;
            }
            buf.push(byte[0]);
        }
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_direct_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();

        let (accepted, connected) = tokio::join!(listener.accept(), ConnectJob::connect(&url, None));
        assert!(accepted.is_ok());
        assert!(connected.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        assert_eq!(
            ConnectJob::connect(&url, None).await.unwrap_err(),
            NetError::ConnectionRefused
        );
    }

    #[tokio::test]
    async fn test_tunnel_through_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let proxy = ProxySettings::new(&format!("http://127.0.0.1:{port}"))
            .unwrap()
            .with_auth("user", "pass");

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_head(&mut stream).await;
            stream
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            (head, buf)
        });

        let url = Url::parse("http://origin.test:8080/page").unwrap();
        let mut stream = ConnectJob::connect(&url, Some(&proxy)).await.unwrap();
        stream.write_all(b"ping").await.unwrap();

        let (head, echoed) = server.await.unwrap();
        assert!(head.starts_with("CONNECT origin.test:8080 HTTP/1.1\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
        assert_eq!(&echoed, b"ping");
    }

    #[tokio::test]
    async fn test_tunnel_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let proxy = ProxySettings::new(&format!("http://127.0.0.1:{port}")).unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_head(&mut stream).await;
            stream
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let url = Url::parse("http://origin.test/").unwrap();
        assert_eq!(
            ConnectJob::connect(&url, Some(&proxy)).await.unwrap_err(),
            NetError::ProxyConnectionFailed
        );
    }
}
