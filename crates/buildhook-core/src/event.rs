//! Inbound events.
//!
//! Events arrive already parsed from the forge or build-service wire format.
//! They are read-only for everything downstream.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::build::{ProjectEventKind, ProjectEventRef};
use crate::forge::ForgeKind;
use crate::job::TriggerType;

/// Pseudo-target under which the build service reports the SRPM build.
pub const SRPM_CHROOT: &str = "srpm-builds";

/// Status code the build service reports for a successful build.
pub const BUILD_SUCCEEDED: i32 = 1;

/// Something that happened upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub forge: ForgeIdentity,
    /// When the service accepted the event for processing.
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Where an event comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeIdentity {
    pub forge: ForgeKind,
    pub namespace: String,
    pub repo: String,
    pub commit_sha: String,
    pub pr_id: Option<u64>,
    /// Login of the user who caused the event.
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    PullRequest {
        action: PullRequestAction,
        target_branch: String,
    },
    Push {
        branch: String,
    },
    Release {
        tag: String,
    },
    /// A `/packit <command>` comment on a pull request.
    Comment {
        command: String,
    },
    CheckRerun {
        check_name: String,
        trigger: TriggerType,
        git_ref: Option<String>,
    },
    BuildStart(BuildCallback),
    BuildEnd(BuildCallback),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Synchronize,
}

/// Payload of a build-service lifecycle callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCallback {
    pub build_id: u64,
    /// Target name, or [`SRPM_CHROOT`] for the source package build.
    pub target: String,
    pub owner: String,
    pub project: String,
    pub package: Option<String>,
    /// Unix timestamp of the reported transition.
    pub timestamp: Option<i64>,
    /// Terminal status code; only meaningful for end callbacks.
    pub status: i32,
}

impl BuildCallback {
    pub fn is_srpm(&self) -> bool {
        self.target == SRPM_CHROOT
    }

    pub fn succeeded(&self) -> bool {
        self.status == BUILD_SUCCEEDED
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    /// Live build log location on the build service's result server.
    pub fn logs_url(&self, results_base: &str) -> String {
        let base = results_base.trim_end_matches('/');
        if self.is_srpm() {
            format!(
                "{}/results/{}/{}/srpm-builds/{:08}/builder-live.log",
                base, self.owner, self.project, self.build_id
            )
        } else {
            format!(
                "{}/results/{}/{}/{}/{:08}-{}/builder-live.log.gz",
                base,
                self.owner,
                self.project,
                self.target,
                self.build_id,
                self.package.as_deref().unwrap_or_default()
            )
        }
    }
}

impl Event {
    pub fn callback(&self) -> Option<&BuildCallback> {
        match &self.kind {
            EventKind::BuildStart(cb) | EventKind::BuildEnd(cb) => Some(cb),
            _ => None,
        }
    }

    /// Trigger type of the job configurations this event can satisfy.
    ///
    /// Callbacks carry no trigger of their own; they are matched through the
    /// build record they refer to.
    pub fn trigger_type(&self) -> Option<TriggerType> {
        match &self.kind {
            EventKind::PullRequest { .. } | EventKind::Comment { .. } => {
                Some(TriggerType::PullRequest)
            }
            EventKind::Push { .. } => Some(TriggerType::Commit),
            EventKind::Release { .. } => Some(TriggerType::Release),
            EventKind::CheckRerun { trigger, .. } => Some(*trigger),
            EventKind::BuildStart(_) | EventKind::BuildEnd(_) => None,
        }
    }

    pub fn is_pull_request_scoped(&self) -> bool {
        self.forge.pr_id.is_some()
            && matches!(self.trigger_type(), Some(TriggerType::PullRequest) | None)
    }

    /// Reference stored on build records created for this event.
    pub fn project_event_ref(&self) -> ProjectEventRef {
        let (kind, branch, tag) = match &self.kind {
            EventKind::Push { branch } => (ProjectEventKind::BranchPush, Some(branch.clone()), None),
            EventKind::Release { tag } => (ProjectEventKind::Release, None, Some(tag.clone())),
            EventKind::CheckRerun {
                trigger: TriggerType::Commit,
                git_ref,
                ..
            } => (ProjectEventKind::BranchPush, git_ref.clone(), None),
            EventKind::CheckRerun {
                trigger: TriggerType::Release,
                git_ref,
                ..
            } => (ProjectEventKind::Release, None, git_ref.clone()),
            _ => (ProjectEventKind::PullRequest, None, None),
        };

        ProjectEventRef {
            kind,
            namespace: self.forge.namespace.clone(),
            repo: self.forge.repo.clone(),
            commit_sha: self.forge.commit_sha.clone(),
            pr_id: self.forge.pr_id,
            branch,
            tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(target: &str) -> BuildCallback {
        BuildCallback {
            build_id: 1234,
            target: target.to_string(),
            owner: "packit".to_string(),
            project: "foo-pr-12".to_string(),
            package: Some("foo".to_string()),
            timestamp: Some(1_700_000_000),
            status: BUILD_SUCCEEDED,
        }
    }

    #[test]
    fn test_srpm_logs_url() {
        let url = callback(SRPM_CHROOT).logs_url("https://copr.example.org/");
        assert_eq!(
            url,
            "https://copr.example.org/results/packit/foo-pr-12/srpm-builds/00001234/builder-live.log"
        );
    }

    #[test]
    fn test_target_logs_url() {
        let url = callback("fedora-rawhide-x86_64").logs_url("https://copr.example.org");
        assert_eq!(
            url,
            "https://copr.example.org/results/packit/foo-pr-12/fedora-rawhide-x86_64/00001234-foo/builder-live.log.gz"
        );
    }

    #[test]
    fn test_timestamp_conversion() {
        let cb = callback("fedora-rawhide-x86_64");
        assert_eq!(cb.timestamp_utc().unwrap().timestamp(), 1_700_000_000);
        assert!(BuildCallback { timestamp: None, ..cb }.timestamp_utc().is_none());
    }

    #[test]
    fn test_push_event_reference() {
        let event = Event {
            kind: EventKind::Push {
                branch: "main".to_string(),
            },
            forge: ForgeIdentity {
                forge: ForgeKind::Github,
                namespace: "the-namespace".to_string(),
                repo: "the-repo".to_string(),
                commit_sha: "abcdef".to_string(),
                pr_id: None,
                actor: None,
            },
            accepted_at: None,
        };

        let reference = event.project_event_ref();
        assert_eq!(reference.kind, ProjectEventKind::BranchPush);
        assert_eq!(reference.branch.as_deref(), Some("main"));
        assert!(!event.is_pull_request_scoped());
        assert_eq!(event.trigger_type(), Some(TriggerType::Commit));
    }
}
