use sbapp_core::PrecompError;

pub const FORGE_ORIGIN: &str = "https://github.com/";
const API_ORIGIN: &str = "https://api.github.com/repos/";

/// `https://github.com/<owner>/<repo>[.git]` to `https://api.github.com/repos/<owner>/<repo>`.
pub fn api_root_from_repo_url(repo_url: &str) -> Result<String, PrecompError> {
    let invalid = || PrecompError::InvalidRepoUrl {
        url: repo_url.to_string(),
        expected_origin: FORGE_ORIGIN.to_string(),
    };

    let path = repo_url
        .trim()
        .strip_prefix(FORGE_ORIGIN)
        .ok_or_else(invalid)?;
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut segments = path.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Ok(format!("{API_ORIGIN}{owner}/{repo}"))
        }
        _ => Err(invalid()),
    }
}

pub fn releases_url(api_root: &str) -> String {
    format!("{api_root}/releases?per_page=100")
}
