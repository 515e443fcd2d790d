//! Copr build service client (API v3) and OpenScanHub submission.

use std::path::Path;

use async_trait::async_trait;
use buildhook_config::ServiceConfig;
use buildhook_core::build::BuiltPackage;
use buildhook_core::service::{
    BuildInfo, BuildRequest, BuildService, BuildTargetInfo, SubmittedBuild,
};
use buildhook_core::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ClientError, into_core};

/// Command line client of the scan service.
pub const OSH_CLI: &str = "osh-cli";

/// Copr client authenticated with a login and API token.
pub struct CoprClient {
    client: reqwest::Client,
    copr_url: String,
    login: Option<String>,
    token: Option<String>,
}

impl CoprClient {
    pub fn new(copr_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            copr_url: copr_url.into(),
            login: None,
            token: None,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut client = Self::new(config.copr_url.clone());
        client.login = config.copr_login.clone();
        client.token = config.copr_token.clone();
        client
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api_3/{}", self.copr_url.trim_end_matches('/'), endpoint)
    }

    pub fn build_web_url(&self, build_id: u64) -> String {
        format!(
            "{}/coprs/build/{}/",
            self.copr_url.trim_end_matches('/'),
            build_id
        )
    }

    fn authenticated(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.login {
            Some(login) => builder.basic_auth(login, self.token.as_deref()),
            None => builder,
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> std::result::Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Api(format!("{} ({}): {}", what, status, text)));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

fn service_error(err: ClientError) -> Error {
    into_core(err, Error::BuildService)
}

fn from_timestamp(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

#[async_trait]
impl BuildService for CoprClient {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo> {
        let build: CoprBuild = self
            .fetch(
                self.client.get(self.api_url(&format!("build/{}", build_id))),
                &format!("copr build {}", build_id),
            )
            .await
            .map_err(service_error)?;
        Ok(BuildInfo {
            id: build.id,
            state: build.state,
            source_package_url: build.source_package.and_then(|p| p.url),
        })
    }

    async fn get_build_target(&self, build_id: u64, target: &str) -> Result<BuildTargetInfo> {
        let what = format!("copr build {} on {}", build_id, target);
        let query = [("build_id", build_id.to_string()), ("chrootname", target.to_string())];

        let chroot: CoprBuildChroot = self
            .fetch(
                self.client.get(self.api_url("build-chroot")).query(&query),
                &what,
            )
            .await
            .map_err(service_error)?;
        let built: CoprBuiltPackages = self
            .fetch(
                self.client
                    .get(self.api_url("build-chroot/built-packages"))
                    .query(&query),
                &what,
            )
            .await
            .map_err(service_error)?;

        Ok(BuildTargetInfo {
            ended_on: from_timestamp(chroot.ended_on),
            built_packages: built.packages,
        })
    }

    async fn submit_build(&self, request: &BuildRequest) -> Result<SubmittedBuild> {
        let payload = serde_json::json!({
            "ownername": request.owner,
            "projectname": request.project,
            "clone_url": request.clone_url,
            "committish": request.committish,
            "chroots": request.targets,
            "source_build_method": "rpkg",
        });
        let builder = self.authenticated(
            self.client
                .post(self.api_url("build/create/scm"))
                .json(&payload),
        );
        let build: CoprBuild = self
            .fetch(builder, "copr build submission")
            .await
            .map_err(service_error)?;

        info!(
            build_id = build.id,
            owner = %request.owner,
            project = %request.project,
            "Copr build created"
        );
        Ok(SubmittedBuild {
            build_id: build.id,
            web_url: self.build_web_url(build.id),
        })
    }

    async fn submit_scan(
        &self,
        srpm: &Path,
        base_srpm: &Path,
        comment: &str,
    ) -> Result<Option<String>> {
        let output = Command::new(OSH_CLI)
            .args(osh_arguments(srpm, base_srpm, comment))
            .output()
            .await
            .map_err(|e| Error::BuildService(format!("{} could not be run: {}", OSH_CLI, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::BuildService(format!(
                "{} exited with {}: {}",
                OSH_CLI,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(output = %stdout, "Scan service output");
        Ok(Some(stdout).filter(|s| !s.trim().is_empty()))
    }
}

/// Arguments of the `osh-cli` call submitting a differential scan.
pub fn osh_arguments(srpm: &Path, base_srpm: &Path, comment: &str) -> Vec<String> {
    vec![
        "version-diff-build".to_string(),
        format!("--srpm={}", srpm.display()),
        format!("--base-srpm={}", base_srpm.display()),
        "--nowait".to_string(),
        "--json".to_string(),
        format!("--comment={}", comment),
    ]
}

#[derive(Debug, Deserialize)]
struct CoprBuild {
    id: u64,
    #[serde(default)]
    state: String,
    source_package: Option<CoprSourcePackage>,
}

#[derive(Debug, Deserialize)]
struct CoprSourcePackage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoprBuildChroot {
    ended_on: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CoprBuiltPackages {
    #[serde(default)]
    packages: Vec<BuiltPackage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_urls() {
        let copr = CoprClient::new("https://copr.example.org/");
        assert_eq!(copr.api_url("build/12"), "https://copr.example.org/api_3/build/12");
        assert_eq!(copr.build_web_url(12), "https://copr.example.org/coprs/build/12/");
    }

    #[test]
    fn test_build_parsing() {
        let build: CoprBuild = serde_json::from_str(
            r#"{"id": 1234, "state": "succeeded", "source_package": {"name": "foo", "url": "https://copr.example.org/foo.src.rpm"}}"#,
        )
        .unwrap();
        assert_eq!(build.id, 1234);
        assert_eq!(
            build.source_package.and_then(|p| p.url).as_deref(),
            Some("https://copr.example.org/foo.src.rpm")
        );

        let pending: CoprBuild =
            serde_json::from_str(r#"{"id": 1, "state": "pending", "source_package": null}"#)
                .unwrap();
        assert!(pending.source_package.is_none());
    }

    #[test]
    fn test_built_packages_parsing() {
        let built: CoprBuiltPackages = serde_json::from_str(
            r#"{"packages": [{"name": "foo", "epoch": 0, "version": "1.0", "release": "1.fc40", "arch": "x86_64"}]}"#,
        )
        .unwrap();
        assert_eq!(built.packages[0].release, "1.fc40");
        assert_eq!(from_timestamp(Some(0)).unwrap().timestamp(), 0);
        assert!(from_timestamp(None).is_none());
    }

    #[test]
    fn test_osh_arguments() {
        let args = osh_arguments(
            &PathBuf::from("/tmp/head/foo.src.rpm"),
            &PathBuf::from("/tmp/base/foo.src.rpm"),
            "Submitted via Packit Service for https://dashboard.packit.dev/jobs/copr/1.",
        );
        assert_eq!(args[0], "version-diff-build");
        assert!(args.contains(&"--srpm=/tmp/head/foo.src.rpm".to_string()));
        assert!(args.contains(&"--base-srpm=/tmp/base/foo.src.rpm".to_string()));
        assert_eq!(
            args.last().unwrap(),
            "--comment=Submitted via Packit Service for https://dashboard.packit.dev/jobs/copr/1."
        );
    }
}
