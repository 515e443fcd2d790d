//! Package configuration parsing.
//!
//! A repository declares its jobs in a `.packit.kdl` file:
//!
//! ```kdl
//! package "python-foo"
//! job "copr_build" trigger="pull_request" {
//!     targets "fedora-rawhide-x86_64" "fedora-40-x86_64"
//!     notifications {
//!         successful-build #true
//!     }
//! }
//! job "tests" trigger="pull_request" {
//!     targets {
//!         target "centos-stream-9-x86_64" build-target="epel-9-x86_64"
//!     }
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use buildhook_core::job::{
    JobConfig, JobType, LabelRequirement, Notifications, PackageConfig, TargetSpec, TriggerType,
};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::path::Path;

/// Read and parse a package configuration file.
pub fn load_package_config(path: &Path) -> ConfigResult<PackageConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_package_config(&text)
}

/// Parse a package configuration from KDL text.
pub fn parse_package_config(kdl: &str) -> ConfigResult<PackageConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut package = None;
    let mut jobs = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "package" => {
                package = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("package name".to_string()))?,
                );
            }
            "job" => {
                jobs.push(parse_job(node)?);
            }
            other => {
                tracing::warn!(node = other, "Ignoring unknown package config node");
            }
        }
    }

    let mut seen = HashSet::new();
    for job in &jobs {
        let key = (
            job.job_type,
            job.trigger,
            job.branch.clone(),
            job.package.clone(),
        );
        if !seen.insert(key) {
            return Err(ConfigError::Duplicate(format!(
                "job '{}' with trigger '{}'{}",
                job.job_type,
                job.trigger,
                job.branch
                    .as_ref()
                    .map(|b| format!(" on branch '{}'", b))
                    .unwrap_or_default()
            )));
        }
    }

    Ok(PackageConfig { package, jobs })
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobConfig> {
    let job_type: JobType = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job type".to_string()))?
        .parse()
        .map_err(|message| ConfigError::InvalidValue {
            field: "job".to_string(),
            message,
        })?;

    let trigger: TriggerType = match get_string_prop(node, "trigger") {
        Some(t) => t.parse().map_err(|message| ConfigError::InvalidValue {
            field: "trigger".to_string(),
            message,
        })?,
        None => TriggerType::PullRequest,
    };

    let mut job = JobConfig::new(job_type, trigger);
    job.branch = get_string_prop(node, "branch");
    job.skip_build = get_bool_prop(node, "skip-build").unwrap_or(false);
    job.manual_trigger = get_bool_prop(node, "manual-trigger").unwrap_or(false);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let name = child.name().value();
            match name {
                "targets" => job.targets = parse_targets(child)?,
                "owner" => job.owner = get_first_string_arg(child),
                "project" => job.project = get_first_string_arg(child),
                "branch" => job.branch = get_first_string_arg(child),
                "package" => job.package = get_first_string_arg(child),
                "labels-present" => job.labels.present = get_all_string_args(child),
                "labels-absent" => job.labels.absent = get_all_string_args(child),
                "skip-build" => job.skip_build = require_bool(child)?,
                "manual-trigger" => job.manual_trigger = require_bool(child)?,
                "sync-test-job-statuses-with-builds" => {
                    job.sync_test_job_statuses_with_builds = require_bool(child)?
                }
                "osh-diff-scan-after-copr-build" => {
                    job.osh_diff_scan_after_copr_build = require_bool(child)?
                }
                "notifications" => job.notifications = parse_notifications(child)?,
                other => {
                    tracing::warn!(job = %job_type, node = other, "Ignoring unknown job option");
                }
            }
        }
    }

    if (job_type.is_build() || job_type == JobType::Tests) && job.targets.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "targets for job '{}'",
            job_type
        )));
    }

    if job.labels != LabelRequirement::default() && trigger != TriggerType::PullRequest {
        tracing::warn!(
            job = %job_type,
            trigger = %trigger,
            "Label requirements only apply to pull request jobs"
        );
    }

    Ok(job)
}

/// `targets "a" "b"` or a block of `target "name" build-target="..."` nodes.
fn parse_targets(node: &KdlNode) -> ConfigResult<Vec<TargetSpec>> {
    let mut targets: Vec<TargetSpec> = get_all_string_args(node)
        .into_iter()
        .map(TargetSpec::new)
        .collect();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "target" {
                return Err(ConfigError::InvalidValue {
                    field: "targets".to_string(),
                    message: format!("unexpected node '{}'", child.name().value()),
                });
            }
            let name = get_first_string_arg(child)
                .ok_or_else(|| ConfigError::MissingField("target name".to_string()))?;
            targets.push(TargetSpec {
                name,
                build_target: get_string_prop(child, "build-target"),
            });
        }
    }

    Ok(targets)
}

fn parse_notifications(node: &KdlNode) -> ConfigResult<Notifications> {
    let mut notifications = Notifications::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "successful-build" => notifications.successful_build = require_bool(child)?,
                "failure-comment" => {
                    notifications.failure_comment = Some(get_first_string_arg(child).ok_or_else(
                        || ConfigError::MissingField("failure-comment message".to_string()),
                    )?)
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "notifications".to_string(),
                        message: format!("unknown notification '{}'", other),
                    });
                }
            }
        }
    }

    Ok(notifications)
}

fn require_bool(node: &KdlNode) -> ConfigResult<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: node.name().value().to_string(),
            message: "expected #true or #false".to_string(),
        })
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_and_tests_jobs() {
        let kdl = r#"
            package "python-foo"
            job "copr_build" trigger="pull_request" {
                targets "fedora-rawhide-x86_64" "fedora-40-x86_64"
                owner "packit"
                project "foo-pr"
                sync-test-job-statuses-with-builds #false
                notifications {
                    successful-build #true
                    failure-comment "Build failed, please check."
                }
            }
            job "tests" trigger="pull_request" skip-build=#false {
                targets {
                    target "centos-stream-9-x86_64" build-target="epel-9-x86_64"
                    target "fedora-rawhide-x86_64"
                }
                labels-present "tests"
                labels-absent "skip-tests"
            }
        "#;

        let config = parse_package_config(kdl).unwrap();
        assert_eq!(config.package.as_deref(), Some("python-foo"));
        assert_eq!(config.jobs.len(), 2);

        let build = &config.jobs[0];
        assert_eq!(build.job_type, JobType::CoprBuild);
        assert_eq!(build.trigger, TriggerType::PullRequest);
        assert_eq!(
            build.build_targets(),
            vec!["fedora-rawhide-x86_64", "fedora-40-x86_64"]
        );
        assert_eq!(build.owner.as_deref(), Some("packit"));
        assert!(!build.sync_test_job_statuses_with_builds);
        assert!(build.osh_diff_scan_after_copr_build);
        assert!(build.notifications.successful_build);
        assert_eq!(
            build.notifications.failure_comment.as_deref(),
            Some("Build failed, please check.")
        );

        let tests = &config.jobs[1];
        assert_eq!(tests.job_type, JobType::Tests);
        assert_eq!(
            tests.targets[0].build_target.as_deref(),
            Some("epel-9-x86_64")
        );
        assert_eq!(tests.labels.present, vec!["tests"]);
        assert_eq!(tests.labels.absent, vec!["skip-tests"]);
        assert!(!tests.skip_build);
    }

    #[test]
    fn test_commit_job_with_branch() {
        let kdl = r#"
            job "build" trigger="commit" branch="main" {
                targets "fedora-rawhide-x86_64"
            }
        "#;

        let config = parse_package_config(kdl).unwrap();
        assert_eq!(config.jobs[0].trigger, TriggerType::Commit);
        assert_eq!(config.jobs[0].branch.as_deref(), Some("main"));
        assert!(config.package.is_none());
    }

    #[test]
    fn test_unknown_job_type() {
        let kdl = r#"
            job "deploy" trigger="pull_request" {
                targets "fedora-rawhide-x86_64"
            }
        "#;

        let result = parse_package_config(kdl);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_trigger() {
        let kdl = r#"
            job "copr_build" trigger="tag" {
                targets "fedora-rawhide-x86_64"
            }
        "#;

        let result = parse_package_config(kdl);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_build_job_needs_targets() {
        let kdl = r#"job "copr_build" trigger="pull_request""#;

        let result = parse_package_config(kdl);
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_detect_duplicate_jobs() {
        let kdl = r#"
            job "copr_build" trigger="commit" branch="main" {
                targets "fedora-rawhide-x86_64"
            }
            job "copr_build" trigger="commit" branch="main" {
                targets "fedora-40-x86_64"
            }
        "#;

        let result = parse_package_config(kdl);
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_same_job_on_different_branches() {
        let kdl = r#"
            job "copr_build" trigger="commit" branch="main" {
                targets "fedora-rawhide-x86_64"
            }
            job "copr_build" trigger="commit" branch="stable" {
                targets "fedora-rawhide-x86_64"
            }
        "#;

        assert_eq!(parse_package_config(kdl).unwrap().jobs.len(), 2);
    }

    #[test]
    fn test_non_bool_toggle_is_rejected() {
        let kdl = r#"
            job "copr_build" trigger="pull_request" {
                targets "fedora-rawhide-x86_64"
                osh-diff-scan-after-copr-build "no"
            }
        "#;

        let result = parse_package_config(kdl);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
