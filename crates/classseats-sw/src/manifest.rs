//! Asset manifest and reserved paths.
//!
//! Each logical resource is listed twice: root-absolute (`/x`) and relative
//! to the registration scope (`./x`). The two coincide when the app is
//! served from the origin root and differ under a sub-path deployment.

use url::Url;

/// Everything prefetched on install.
pub const CORE_ASSETS: [&str; 12] = [
    "/",
    "./",
    "/index.html",
    "./index.html",
    "/manifest.webmanifest",
    "./manifest.webmanifest",
    "/icons/icon-192.png",
    "./icons/icon-192.png",
    "/icons/icon-512.png",
    "./icons/icon-512.png",
    "/icons/apple-touch-icon.png",
    "./icons/apple-touch-icon.png",
];

/// Shell aliases checked after install, and by the navigation fallback.
/// Order matters: first hit wins.
pub const SHELL_ASSETS: [&str; 4] = ["/", "./", "/index.html", "./index.html"];

/// Shell aliases checked on activate. Index documents only; narrower than
/// [`SHELL_ASSETS`] on purpose, do not unify.
pub const ACTIVATE_SHELL_ASSETS: [&str; 2] = ["/index.html", "./index.html"];

/// File extensions served cache-first.
pub const STATIC_EXTENSIONS: [&str; 7] = ["js", "css", "png", "svg", "ico", "webmanifest", "json"];

/// Connectivity probe; never cached.
pub const PROBE_PATH: &str = "/ping.txt";

/// Resolve a manifest alias against the registration scope.
pub fn resolve_asset(scope: &Url, asset: &str) -> Result<Url, url::ParseError> {
    scope.join(asset)
}

/// Whether `path` names a static asset by extension or by manifest entry.
pub fn is_static_path(path: &str) -> bool {
    has_static_extension(path) || CORE_ASSETS.iter().any(|asset| asset.ends_with(path))
}

fn has_static_extension(path: &str) -> bool {
    match path.rsplit_once('.') {
        Some((_, ext)) => STATIC_EXTENSIONS.contains(&ext),
        None => false,
    }
}
