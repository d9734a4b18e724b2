//! certgen - provision the self-signed TLS identity used by the local
//! HTTP/2 test servers.

use anyhow::Result;

fn main() -> Result<()> {
    tls_identity_cli::run()
}
