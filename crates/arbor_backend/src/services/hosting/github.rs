use arbor_domain::{CodeReview, CodeReviewState, HostingError, HostingProviderKind};
use reqwest::Url;

use super::{CodeReviewProvider, endpoint, get_json, parse_base_url};

pub(super) const DEFAULT_API_URL: &str = "https://api.github.com";

pub struct GitHubProvider {
    api_url: Url,
    token: Option<String>,
}

impl GitHubProvider {
    pub fn new(api_url: &str, token: Option<&str>) -> Result<Self, HostingError> {
        Ok(Self {
            api_url: parse_base_url(api_url)?,
            token: token.map(ToOwned::to_owned),
        })
    }
}

#[derive(serde::Deserialize)]
struct PullRequestResponse {
    id: u64,
    number: u64,
    title: String,
    state: String,
    html_url: String,
    #[serde(default)]
    merged_at: Option<String>,
}

fn code_review_from_pull(pull: PullRequestResponse) -> CodeReview {
    let state = if pull.merged_at.is_some() {
        CodeReviewState::Merged
    } else {
        CodeReviewState::parse(&pull.state).unwrap_or(CodeReviewState::Closed)
    };
    CodeReview {
        id: pull.id,
        number: pull.number,
        title: pull.title,
        state,
        web_url: pull.html_url,
        // Check runs live behind a separate endpoint.
        pipeline: None,
    }
}

impl CodeReviewProvider for GitHubProvider {
    fn kind(&self) -> HostingProviderKind {
        HostingProviderKind::GitHub
    }

    fn find_code_review(
        &self,
        project_path: &str,
        branch: &str,
    ) -> Result<Option<CodeReview>, HostingError> {
        let (owner, repo) = project_path
            .split_once('/')
            .ok_or_else(|| HostingError::InvalidRemoteUrl(project_path.to_owned()))?;
        let mut url = endpoint(&self.api_url, &["repos", owner, repo, "pulls"])?;
        url.query_pairs_mut()
            .append_pair("head", &format!("{owner}:{branch}"))
            .append_pair("state", "all")
            .append_pair("per_page", "1");

        let authorization = self.token.as_ref().map(|t| format!("Bearer {t}"));
        let mut headers = vec![
            ("Accept", "application/vnd.github+json"),
            ("X-GitHub-Api-Version", "2022-11-28"),
        ];
        if let Some(value) = authorization.as_deref() {
            headers.push(("Authorization", value));
        }

        let pulls: Vec<PullRequestResponse> = get_json(url, &headers)?;
        Ok(pulls.into_iter().next().map(code_review_from_pull))
    }
}
