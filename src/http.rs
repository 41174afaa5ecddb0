//! Small URL helpers shared by the HTTP clients.

/// Parse and normalize a base URL, trimming any trailing slash from the path.
pub(crate) fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

/// Join a base URL and an endpoint path with exactly one separating slash.
pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        let url = normalize_base_url("http://localhost:8000/api/").expect("valid url");
        assert_eq!(url, "http://localhost:8000/api");
    }

    #[test]
    fn normalize_base_url_rejects_garbage() {
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn format_endpoint_joins_with_single_slash() {
        assert_eq!(
            format_endpoint("http://localhost:8000/", "/api/v1/collections"),
            "http://localhost:8000/api/v1/collections"
        );
    }
}
