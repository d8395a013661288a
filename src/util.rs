/// Derive a local filename from a pre-signed file URL.
///
/// The query string is dropped, the last `/`-delimited path segment is
/// taken, and every literal `%3A` sequence (a percent-encoded colon, as
/// appears in timestamp-bearing object names) is replaced with `_` so that
/// the name is usable on filesystems that reject colons.
pub(crate) fn filename_from_url(url: &str) -> String {
    let path = match url.split_once('?') {
        Some((before, _)) => before,
        None => url,
    };
    let name = match path.rsplit_once('/') {
        Some((_, after)) => after,
        None => path,
    };
    name.replace("%3A", "_")
}

/// Expand `{name}` placeholders in an endpoint path template.
///
/// Placeholders without a matching parameter are left untouched.
pub(crate) fn expand_path(template: &str, params: &[(&str, &str)]) -> String {
    let mut path = template.to_owned();
    for (name, value) in params {
        path = path.replace(&format!("{{{name}}}"), value);
    }
    path
}
