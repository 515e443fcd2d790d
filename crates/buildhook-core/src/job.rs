//! Job configuration declared in a repository's package config.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[display("build")]
    Build,
    #[display("copr_build")]
    CoprBuild,
    #[display("tests")]
    Tests,
    #[display("propose_downstream")]
    ProposeDownstream,
    #[display("koji_build")]
    KojiBuild,
}

impl JobType {
    pub fn is_build(self) -> bool {
        matches!(self, JobType::Build | JobType::CoprBuild)
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(JobType::Build),
            "copr_build" => Ok(JobType::CoprBuild),
            "tests" => Ok(JobType::Tests),
            "propose_downstream" => Ok(JobType::ProposeDownstream),
            "koji_build" => Ok(JobType::KojiBuild),
            _ => Err(format!("unknown job type: {}", s)),
        }
    }
}

/// Which kind of upstream event a job reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[display("pull_request")]
    PullRequest,
    #[display("commit")]
    Commit,
    #[display("release")]
    Release,
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_request" => Ok(TriggerType::PullRequest),
            "commit" => Ok(TriggerType::Commit),
            "release" => Ok(TriggerType::Release),
            _ => Err(format!("unknown trigger: {}", s)),
        }
    }
}

/// A target of a job.
///
/// Test jobs may run on a different target than the build they consume;
/// `build_target` names that build. Build jobs leave it unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub build_target: Option<String>,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build_target: None,
        }
    }

    pub fn build_target(&self) -> &str {
        self.build_target.as_deref().unwrap_or(&self.name)
    }
}

/// Pull request labels a job requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRequirement {
    /// At least one of these must be present.
    pub present: Vec<String>,
    /// None of these may be present.
    pub absent: Vec<String>,
}

impl LabelRequirement {
    pub fn is_empty(&self) -> bool {
        self.present.is_empty() && self.absent.is_empty()
    }

    pub fn is_satisfied_by(&self, labels: &[String]) -> bool {
        let has = |wanted: &String| labels.iter().any(|l| l == wanted);

        (self.present.is_empty() || self.present.iter().any(has))
            && !self.absent.iter().any(has)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    /// Comment on the pull request when a build succeeds.
    pub successful_build: bool,
    /// Comment posted on the pull request when a build fails.
    pub failure_comment: Option<String>,
}

/// A single job declared in the package config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_type: JobType,
    pub trigger: TriggerType,
    pub targets: Vec<TargetSpec>,
    pub owner: Option<String>,
    pub project: Option<String>,
    /// Branch for commit-triggered jobs.
    pub branch: Option<String>,
    /// Package view this job belongs to in a multi-package repository.
    pub package: Option<String>,
    pub labels: LabelRequirement,
    /// Tests run without building in the build service.
    pub skip_build: bool,
    /// Only run when explicitly requested.
    pub manual_trigger: bool,
    pub sync_test_job_statuses_with_builds: bool,
    pub osh_diff_scan_after_copr_build: bool,
    pub notifications: Notifications,
}

impl JobConfig {
    pub fn new(job_type: JobType, trigger: TriggerType) -> Self {
        Self {
            job_type,
            trigger,
            targets: Vec::new(),
            owner: None,
            project: None,
            branch: None,
            package: None,
            labels: LabelRequirement::default(),
            skip_build: false,
            manual_trigger: false,
            sync_test_job_statuses_with_builds: true,
            osh_diff_scan_after_copr_build: true,
            notifications: Notifications::default(),
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(TargetSpec::new).collect();
        self
    }

    /// Build targets this job needs, in declaration order, without duplicates.
    pub fn build_targets(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for target in &self.targets {
            let name = target.build_target();
            if !result.iter().any(|t| t == name) {
                result.push(name.to_string());
            }
        }
        result
    }

    /// Test targets that consume the build of `build_target`.
    pub fn test_targets_for(&self, build_target: &str) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.build_target() == build_target)
            .map(|t| t.name.clone())
            .collect()
    }
}

/// All jobs configured for a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Default package name, used when a job does not name its own view.
    pub package: Option<String>,
    pub jobs: Vec<JobConfig>,
}

impl PackageConfig {
    /// Jobs with their package view resolved.
    pub fn get_job_views(&self) -> Vec<JobConfig> {
        self.jobs
            .iter()
            .map(|job| {
                let mut view = job.clone();
                if view.package.is_none() {
                    view.package = self.package.clone();
                }
                view
            })
            .collect()
    }

    /// Test jobs with the given trigger.
    pub fn tests_jobs(&self, trigger: TriggerType) -> Vec<JobConfig> {
        self.get_job_views()
            .into_iter()
            .filter(|j| j.job_type == JobType::Tests && j.trigger == trigger)
            .collect()
    }
}
