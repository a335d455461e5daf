//! Optional SOCKS5 outbound tunnel (§6 `socks5_dialer`), used when
//! `Config::use_socks5` is set. A thin wrapper so the peer group can
//! treat direct and proxied dials identically once a `TcpStream` comes
//! back out.

use std::net::TcpStream;

use socks::Socks5Stream;

use crate::error::{Error, Result};

/// Dials `target` through the SOCKS5 proxy at `proxy`, returning the
/// underlying TCP stream once the SOCKS handshake completes.
pub fn dial_via_socks5(proxy: (&str, u16), target: (&str, u16)) -> Result<TcpStream> {
    let stream = Socks5Stream::connect(proxy, target).map_err(|e| Error::Socks5(e.to_string()))?;
    Ok(stream.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialing_with_no_proxy_listening_fails_cleanly() {
        // No SOCKS5 proxy is running in the test environment; this
        // exercises the error path rather than a live tunnel.
        let result = dial_via_socks5(("127.0.0.1", 1), ("example.invalid", 80));
        assert!(result.is_err());
    }
}
