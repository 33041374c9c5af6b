//! Download interceptor.
//!
//! Registry tarball URLs look like `/<package>/-/<filename>`, e.g.
//! `/@scope%2Fpkg/-/@scope/pkg-1.2.3.tgz`. Matching `GET` requests schedule
//! a count on a background task; every request is forwarded unchanged.

use std::borrow::Cow;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use dlcount_counter::DownloadCounter;

/// The two wildcard captures of a tarball URL, percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub package: String,
    pub filename: String,
}

/// Split `/<package>/-/<filename>` at the last `/-/`.
///
/// Returns `None` for paths without that separator. Either capture may be
/// empty. Invalid percent-encoding leaves the segment as-is.
pub fn parse_download_path(path: &str) -> Option<DownloadRequest> {
    let rest = path.strip_prefix('/')?;
    let (package, filename) = rest.rsplit_once("/-/")?;
    Some(DownloadRequest {
        package: decode(package),
        filename: decode(filename),
    })
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| segment.to_string())
}

/// Middleware counting `GET` tarball downloads.
///
/// Counting runs on a detached task so the response is never delayed, and
/// its failures are logged by [`DownloadCounter::record`].
pub async fn count_downloads(
    State(counter): State<Arc<DownloadCounter>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::GET {
        if let Some(download) = parse_download_path(request.uri().path()) {
            tracing::trace!(
                package = %download.package,
                filename = %download.filename,
                "scheduling download count"
            );
            tokio::spawn(async move {
                counter.record(&download.package, &download.filename).await;
            });
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(path: &str) -> Option<(String, String)> {
        parse_download_path(path).map(|d| (d.package, d.filename))
    }

    #[test]
    fn unscoped_tarball() {
        assert_eq!(
            parsed("/lodash/-/lodash-4.17.21.tgz"),
            Some(("lodash".to_string(), "lodash-4.17.21.tgz".to_string()))
        );
    }

    #[test]
    fn scoped_tarball_is_percent_decoded() {
        assert_eq!(
            parsed("/@scope%2Fpkg/-/@scope/pkg-1.2.3.tgz"),
            Some(("@scope/pkg".to_string(), "@scope/pkg-1.2.3.tgz".to_string()))
        );
        assert_eq!(
            parsed("/@scope/pkg/-/pkg-1.2.3.tgz"),
            Some(("@scope/pkg".to_string(), "pkg-1.2.3.tgz".to_string()))
        );
    }

    #[test]
    fn splits_at_last_separator() {
        assert_eq!(
            parsed("/a/-/b/-/c.tgz"),
            Some(("a/-/b".to_string(), "c.tgz".to_string()))
        );
    }

    #[test]
    fn non_download_paths() {
        assert_eq!(parsed("/lodash"), None);
        assert_eq!(parsed("/-/"), None);
        assert_eq!(parsed("/-/v1/search"), None);
        assert_eq!(parsed("lodash/-/lodash-1.0.0.tgz"), None);
        assert_eq!(parsed(""), None);
    }

    #[test]
    fn empty_captures_are_kept() {
        assert_eq!(parsed("//-/"), Some((String::new(), String::new())));
    }

    #[test]
    fn invalid_percent_encoding_is_left_raw() {
        assert_eq!(
            parsed("/pkg%FF/-/pkg-1.0.0.tgz"),
            Some(("pkg%FF".to_string(), "pkg-1.0.0.tgz".to_string()))
        );
    }
}
