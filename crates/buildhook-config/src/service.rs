//! Service-wide settings read from the environment.

use buildhook_core::build::{ProjectEventKind, ProjectEventRef};
use buildhook_core::job::JobConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DASHBOARD_URL: &str = "https://dashboard.packit.dev";
pub const DEFAULT_COPR_URL: &str = "https://copr.fedorainfracloud.org";
pub const DEFAULT_COPR_USER: &str = "packit";
pub const DEFAULT_SCAN_TARGET: &str = "fedora-rawhide-x86_64";
pub const DOCS_URL: &str = "https://packit.dev/docs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    #[default]
    Prod,
    Stg,
}

impl Deployment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "stg" | "staging" => Deployment::Stg,
            _ => Deployment::Prod,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub dashboard_url: String,
    pub deployment: Deployment,
    /// Owner of build-service projects when a job does not name one.
    pub copr_user: String,
    pub copr_url: String,
    /// The one target whose successful builds are diff-scanned.
    pub scan_target: String,
    pub osh_disabled: bool,
    pub database_url: Option<String>,
    pub github_token: Option<String>,
    pub copr_login: Option<String>,
    pub copr_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            dashboard_url: non_empty("BUILDHOOK_DASHBOARD_URL")
                .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.to_string()),
            deployment: non_empty("BUILDHOOK_DEPLOYMENT")
                .map(|v| Deployment::parse(&v))
                .unwrap_or_default(),
            copr_user: non_empty("BUILDHOOK_COPR_USER")
                .unwrap_or_else(|| DEFAULT_COPR_USER.to_string()),
            copr_url: non_empty("BUILDHOOK_COPR_URL")
                .unwrap_or_else(|| DEFAULT_COPR_URL.to_string()),
            scan_target: non_empty("BUILDHOOK_SCAN_TARGET")
                .unwrap_or_else(|| DEFAULT_SCAN_TARGET.to_string()),
            osh_disabled: lookup("DISABLE_OPENSCANHUB").is_some_and(|v| is_truthy(&v)),
            database_url: non_empty("DATABASE_URL"),
            github_token: non_empty("GITHUB_TOKEN"),
            copr_login: non_empty("COPR_LOGIN"),
            copr_token: non_empty("COPR_TOKEN"),
        }
    }

    pub fn build_dashboard_url(&self, build_record_id: i64) -> String {
        format!(
            "{}/jobs/copr/{}",
            self.dashboard_url.trim_end_matches('/'),
            build_record_id
        )
    }

    pub fn srpm_dashboard_url(&self, srpm_record_id: i64) -> String {
        format!(
            "{}/jobs/srpm/{}",
            self.dashboard_url.trim_end_matches('/'),
            srpm_record_id
        )
    }

    /// Owner a job builds under.
    pub fn job_owner(&self, job: &JobConfig) -> String {
        job.owner.clone().unwrap_or_else(|| self.copr_user.clone())
    }

    /// Project a job builds into for the given triggering event.
    pub fn job_project(&self, job: &JobConfig, event: &ProjectEventRef) -> String {
        job.project
            .clone()
            .unwrap_or_else(|| self.default_project_name(event))
    }

    /// `<namespace>-<repo>-<pr id | branch | "releases">`, suffixed with
    /// `-stg` in staging.
    pub fn default_project_name(&self, event: &ProjectEventRef) -> String {
        let suffix = match event.kind {
            ProjectEventKind::PullRequest => event
                .pr_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "pr".to_string()),
            ProjectEventKind::BranchPush => event.branch.clone().unwrap_or_else(|| "main".to_string()),
            ProjectEventKind::Release => "releases".to_string(),
        };

        let mut name = format!(
            "{}-{}-{}",
            event.namespace.replace('/', "-"),
            event.repo,
            suffix
        );
        if self.deployment == Deployment::Stg {
            name.push_str("-stg");
        }
        name
    }
}

/// Environment-style boolean: `true`, `t`, `yes`, `y` or `1`, any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "y" | "1"
    )
}
