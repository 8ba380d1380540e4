use arbor_domain::{
    CodeReview, CodeReviewState, HostingError, HostingProviderKind, Pipeline, PipelineStatus,
};
use reqwest::Url;

use super::{CodeReviewProvider, endpoint, get_json, parse_base_url};

pub(super) const DEFAULT_BASE_URL: &str = "https://gitlab.com";

pub struct GitLabProvider {
    base_url: Url,
    token: String,
}

impl GitLabProvider {
    pub fn new(base_url: &str, token: &str) -> Result<Self, HostingError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            token: token.to_owned(),
        })
    }
}

#[derive(serde::Deserialize)]
struct MergeRequestResponse {
    id: u64,
    iid: u64,
    title: String,
    state: String,
    web_url: String,
    #[serde(default)]
    head_pipeline: Option<PipelineResponse>,
}

#[derive(serde::Deserialize)]
struct PipelineResponse {
    id: u64,
    status: String,
    #[serde(default)]
    web_url: Option<String>,
}

fn code_review_from_merge_request(mr: MergeRequestResponse) -> CodeReview {
    CodeReview {
        id: mr.id,
        number: mr.iid,
        title: mr.title,
        // "locked" is a transient open state on GitLab.
        state: CodeReviewState::parse(&mr.state).unwrap_or(CodeReviewState::Open),
        web_url: mr.web_url,
        pipeline: mr.head_pipeline.map(|p| Pipeline {
            id: p.id,
            status: PipelineStatus::parse(&p.status),
            web_url: p.web_url,
        }),
    }
}

impl CodeReviewProvider for GitLabProvider {
    fn kind(&self) -> HostingProviderKind {
        HostingProviderKind::GitLab
    }

    fn find_code_review(
        &self,
        project_path: &str,
        branch: &str,
    ) -> Result<Option<CodeReview>, HostingError> {
        let mut url = endpoint(
            &self.base_url,
            &["api", "v4", "projects", project_path, "merge_requests"],
        )?;
        url.query_pairs_mut()
            .append_pair("source_branch", branch)
            .append_pair("order_by", "updated_at")
            .append_pair("per_page", "1");

        let requests: Vec<MergeRequestResponse> =
            get_json(url, &[("PRIVATE-TOKEN", self.token.as_str())])?;
        Ok(requests.into_iter().next().map(code_review_from_merge_request))
    }
}
