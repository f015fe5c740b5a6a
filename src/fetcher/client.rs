//! Artifact download: URL validation, SSRF sinkhole protection, a bounded
//! streaming read into a scoped workspace, and content-based MIME detection.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::fetcher::{errors::FetchError, workspace::Workspace};

const USER_AGENT: &str = "textmill/1.0";
const SNIFF_BYTES: usize = 8192;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("Failed to build HTTP client")
});

/// A downloaded file plus the workspace that owns it. Dropping the artifact
/// removes the workspace directory.
#[derive(Debug)]
pub struct Artifact {
    pub workspace: Workspace,
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
}

/// Validate a download URL against the SSRF policy.
///
/// `https` is required. `http` is accepted only when `allow_private` is set
/// AND the host is a local name or a private/loopback address. Private hosts
/// are otherwise rejected outright so the container cannot be used as a
/// relay into internal networks.
pub fn validate_download_url(raw_url: &str, allow_private: bool) -> Result<(), FetchError> {
    let parsed = url::Url::parse(raw_url.trim()).map_err(|_| FetchError::InvalidUrl)?;

    let host = parsed
        .host_str()
        .map(|h| h.trim_matches(['[', ']']).to_lowercase())
        .unwrap_or_default();
    if host.is_empty() {
        return Err(FetchError::InvalidUrl);
    }

    let is_local_name = host == "localhost" || host.ends_with(".localhost");
    let is_private_ip = host
        .parse::<IpAddr>()
        .map(is_private_or_local_ip)
        .unwrap_or(false);

    match parsed.scheme() {
        "https" => {}
        "http" => {
            if !(allow_private && (is_local_name || is_private_ip)) {
                return Err(FetchError::InvalidUrl);
            }
        }
        _ => return Err(FetchError::InvalidUrl),
    }

    if is_local_name || is_private_ip {
        if allow_private {
            return Ok(());
        }
        return Err(FetchError::HostNotAllowed);
    }

    Ok(())
}

/// Addresses that must never be fetched by default: loopback, link-local,
/// multicast, unspecified, RFC1918 private space, and RFC6598 CGNAT space.
fn is_private_or_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            if v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_private()
            {
                return true;
            }
            // RFC6598 carrier-grade NAT: 100.64.0.0/10
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_multicast() || v6.is_unspecified() {
                return true;
            }
            let seg = v6.segments();
            // fc00::/7 unique-local, fe80::/10 link-local
            (seg[0] & 0xfe00) == 0xfc00 || (seg[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Download `url` into a fresh workspace, reading at most `max_bytes + 1`
/// bytes. Returns the artifact with its detected MIME type. The workspace is
/// removed on every failure path by `Workspace`'s drop.
#[instrument(skip_all, fields(url = %url))]
pub async fn download_to_temp(
    url: &str,
    file_name: &str,
    max_bytes: u64,
    timeout: Duration,
    allow_private: bool,
) -> Result<Artifact, FetchError> {
    validate_download_url(url, allow_private)?;

    let workspace = Workspace::create().map_err(|e| FetchError::Io(e.to_string()))?;
    let out_path = workspace.file_path(file_name);

    let response = HTTP_CLIENT
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(FetchError::from_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http(status.as_u16()));
    }

    // Cheap reject before reading the body when the server declares a size.
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(FetchError::TooLarge(max_bytes / (1 << 20)));
        }
    }

    let declared_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let mut file = tokio::fs::File::create(&out_path)
        .await
        .map_err(|e| FetchError::Io(e.to_string()))?;

    let mut written: u64 = 0;
    let mut response = response;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(FetchError::from_reqwest_error)?
    {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(FetchError::TooLarge(max_bytes / (1 << 20)));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|e| FetchError::Io(e.to_string()))?;
    drop(file);

    let mime_type = match sniff_mime_type(&out_path).await {
        Some(mt) => mt,
        None => strip_mime_params(&declared_type),
    };

    Ok(Artifact {
        workspace,
        path: out_path,
        mime_type,
        size: written,
    })
}

/// Magic-byte detection over the leading bytes of the saved file.
async fn sniff_mime_type(path: &Path) -> Option<String> {
    let mut buf = vec![0u8; SNIFF_BYTES];
    let n = {
        use tokio::io::AsyncReadExt;
        let mut f = tokio::fs::File::open(path).await.ok()?;
        f.read(&mut buf).await.ok()?
    };
    if n == 0 {
        return None;
    }
    infer::get(&buf[..n]).map(|t| t.mime_type().to_lowercase())
}

fn strip_mime_params(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_public_host_is_allowed() {
        assert!(validate_download_url("https://cdn.example.com/file.pdf", false).is_ok());
    }

    #[test]
    fn http_is_rejected_by_default() {
        assert!(matches!(
            validate_download_url("http://cdn.example.com/file.pdf", false),
            Err(FetchError::InvalidUrl)
        ));
    }

    #[test]
    fn private_hosts_are_sinkholed() {
        for url in [
            "https://localhost/file.pdf",
            "https://svc.localhost/file.pdf",
            "https://127.0.0.1/file.pdf",
            "https://10.0.0.8/file.pdf",
            "https://192.168.1.1/file.pdf",
            "https://172.16.0.1/file.pdf",
            "https://100.64.0.1/file.pdf",
            "https://169.254.169.254/latest/meta-data",
            "https://[::1]/file.pdf",
            "https://[fd00::1]/file.pdf",
        ] {
            assert!(
                matches!(
                    validate_download_url(url, false),
                    Err(FetchError::HostNotAllowed)
                ),
                "expected sinkhole for {url}"
            );
        }
    }

    #[test]
    fn operator_flag_opens_private_http() {
        assert!(validate_download_url("http://localhost:9000/f.pdf", true).is_ok());
        assert!(validate_download_url("http://127.0.0.1/f.pdf", true).is_ok());
        // public http stays rejected even with the flag
        assert!(validate_download_url("http://example.com/f.pdf", true).is_err());
    }

    #[test]
    fn garbage_urls_are_invalid() {
        assert!(validate_download_url("not-a-url", false).is_err());
        assert!(validate_download_url("ftp://example.com/x", false).is_err());
        assert!(validate_download_url("", false).is_err());
    }

    #[test]
    fn cgnat_range_detection() {
        assert!(is_private_or_local_ip("100.64.0.1".parse().unwrap()));
        assert!(is_private_or_local_ip("100.127.255.255".parse().unwrap()));
        assert!(!is_private_or_local_ip("100.63.0.1".parse().unwrap()));
        assert!(!is_private_or_local_ip("100.128.0.1".parse().unwrap()));
    }

    #[test]
    fn strips_content_type_params() {
        assert_eq!(
            strip_mime_params("Application/PDF; charset=binary"),
            "application/pdf"
        );
        assert_eq!(strip_mime_params(""), "");
    }
}
