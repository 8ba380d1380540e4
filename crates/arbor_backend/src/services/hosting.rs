use arbor_domain::{CodeReview, HostingError, HostingProviderKind, HostingSettings};
use reqwest::Url;
use std::time::Duration;

mod github;
mod gitlab;

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("arbor/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Looks up the open (or most recent) code review for a branch.
///
/// Implementations make one blocking request per lookup and never retry.
pub trait CodeReviewProvider: Send + Sync {
    fn kind(&self) -> HostingProviderKind;

    /// `project_path` is the `owner/name` (or `group/sub/name`) form.
    fn find_code_review(
        &self,
        project_path: &str,
        branch: &str,
    ) -> Result<Option<CodeReview>, HostingError>;

    fn find_code_review_for_remote(
        &self,
        remote_url: &str,
        branch: &str,
    ) -> Result<Option<CodeReview>, HostingError> {
        let project_path = project_path_from_remote_url(remote_url)?;
        tracing::debug!(provider = ?self.kind(), project_path, branch, "looking up code review");
        self.find_code_review(&project_path, branch)
    }
}

pub fn code_review_provider(
    settings: &HostingSettings,
) -> Result<Box<dyn CodeReviewProvider>, HostingError> {
    let base_url = non_empty(settings.base_url.as_deref());
    let token = non_empty(settings.token.as_deref());
    match settings.provider {
        None => Err(HostingError::NotConfigured),
        Some(HostingProviderKind::GitHub) => Ok(Box::new(GitHubProvider::new(
            base_url.unwrap_or(github::DEFAULT_API_URL),
            token,
        )?)),
        Some(HostingProviderKind::GitLab) => {
            let token = token.ok_or(HostingError::NotConfigured)?;
            Ok(Box::new(GitLabProvider::new(
                base_url.unwrap_or(gitlab::DEFAULT_BASE_URL),
                token,
            )?))
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Extracts `group/name` from ssh, scp-like and http(s) remote urls.
pub fn project_path_from_remote_url(remote_url: &str) -> Result<String, HostingError> {
    let invalid = || HostingError::InvalidRemoteUrl(remote_url.to_owned());
    let trimmed = remote_url.trim();

    let path = if let Some((_, rest)) = trimmed.split_once("://") {
        // scheme://[user@]host[:port]/path
        let (_, path) = rest.split_once('/').ok_or_else(invalid)?;
        path
    } else if let Some((host, path)) = trimmed.split_once(':') {
        // user@host:path
        if host.is_empty() || host.contains('/') {
            return Err(invalid());
        }
        path
    } else {
        return Err(invalid());
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(invalid());
    }
    Ok(segments.join("/"))
}

pub(super) fn parse_base_url(raw: &str) -> Result<Url, HostingError> {
    let url = Url::parse(raw.trim()).map_err(|_| HostingError::InvalidRemoteUrl(raw.to_owned()))?;
    if url.cannot_be_a_base() {
        return Err(HostingError::InvalidRemoteUrl(raw.to_owned()));
    }
    Ok(url)
}

pub(super) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, HostingError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| HostingError::InvalidRemoteUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Sends one GET and decodes the body as `T`.
pub(super) fn get_json<T: serde::de::DeserializeOwned>(
    url: Url,
    headers: &[(&str, &str)],
) -> Result<T, HostingError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| HostingError::NetworkError(err.to_string()))?;

    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request
        .send()
        .map_err(|err| HostingError::NetworkError(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(HostingError::ApiError {
            code: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }
    response
        .json::<T>()
        .map_err(|err| HostingError::NetworkError(format!("invalid response body: {err}")))
}
