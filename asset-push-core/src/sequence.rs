//! Upload ordering and plan construction.
//!
//! HTML pages reference the scripts and styles uploaded alongside them, so all
//! other files go first and HTML goes last. Within each group the traversal
//! order is kept, which makes the plan deterministic.

use std::path::{Path, PathBuf};

use crate::filter::PendingFile;
use crate::manifest::{is_html, Fingerprint};

/// One file scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub relative_path: String,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub fingerprint: Fingerprint,
}

/// Non-HTML files first, then HTML, each group in input order.
pub fn order(files: Vec<PendingFile>) -> Vec<PendingFile> {
    let (html, mut ordered): (Vec<_>, Vec<_>) =
        files.into_iter().partition(|f| is_html(&f.path));
    ordered.extend(html);
    ordered
}

/// Join the destination prefix and a relative path into an object key.
pub fn remote_key(dest_prefix: &str, relative_path: &str) -> String {
    let prefix = dest_prefix.trim_matches('/');
    if prefix.is_empty() {
        relative_path.to_string()
    } else {
        format!("{prefix}/{relative_path}")
    }
}

/// Turn ordered files into the upload plan.
pub fn plan(ordered: Vec<PendingFile>, code_root: &Path, dest_prefix: &str) -> Vec<CandidateFile> {
    ordered
        .into_iter()
        .map(|f| CandidateFile {
            local_path: code_root.join(&f.path),
            remote_key: remote_key(dest_prefix, &f.path),
            relative_path: f.path,
            fingerprint: f.fingerprint,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(paths: &[&str]) -> Vec<PendingFile> {
        paths
            .iter()
            .map(|p| PendingFile {
                path: p.to_string(),
                fingerprint: Fingerprint::UPLOADED,
            })
            .collect()
    }

    fn paths(files: &[PendingFile]) -> Vec<&str> {
        files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn html_goes_last_preserving_relative_order() {
        let ordered = order(pending(&["a.js", "b.html", "c.js", "docs/index.html", "img/logo.png"]));
        assert_eq!(
            paths(&ordered),
            vec!["a.js", "c.js", "img/logo.png", "b.html", "docs/index.html"]
        );
    }

    #[test]
    fn no_html_before_any_asset() {
        let ordered = order(pending(&["z.html", "y.html", "x.css", "w.html", "v.js"]));
        let first_html = ordered.iter().position(|f| is_html(&f.path)).unwrap();
        assert!(ordered[first_html..].iter().all(|f| is_html(&f.path)));
        assert_eq!(first_html, 2);
    }

    #[test]
    fn remote_key_joins_prefix() {
        assert_eq!(remote_key("", "a.js"), "a.js");
        assert_eq!(remote_key("docs", "a.js"), "docs/a.js");
        assert_eq!(remote_key("/docs/", "static/a.js"), "docs/static/a.js");
        assert_eq!(remote_key("/", "a.js"), "a.js");
    }

    #[test]
    fn plan_resolves_local_and_remote_paths() {
        let files = plan(order(pending(&["index.html", "static/app.js"])), Path::new("/site"), "v2");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, "static/app.js");
        assert_eq!(files[0].local_path, Path::new("/site/static/app.js"));
        assert_eq!(files[0].remote_key, "v2/static/app.js");
        assert_eq!(files[1].remote_key, "v2/index.html");
    }
}
