//! PostgreSQL build record repository.

use async_trait::async_trait;
use buildhook_core::build::{
    BuildField, BuildFilter, BuildStatus, BuildTargetRecord, BuiltPackage, NewBuildTarget,
    NewSrpmBuild, ProjectEventRef, SrpmBuildRecord,
};
use buildhook_core::store::BuildStore;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, warn};

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SrpmBuildRow {
    id: i64,
    build_id: Option<String>,
    status: String,
    url: Option<String>,
    logs_url: Option<String>,
    web_url: Option<String>,
    build_start_time: Option<DateTime<Utc>>,
    build_finished_time: Option<DateTime<Utc>>,
    project_event: Json<ProjectEventRef>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BuildTargetRow {
    id: i64,
    build_id: String,
    srpm_build_id: i64,
    target: String,
    owner: String,
    project_name: String,
    status: String,
    web_url: Option<String>,
    build_logs_url: Option<String>,
    build_start_time: Option<DateTime<Utc>>,
    build_finished_time: Option<DateTime<Utc>>,
    built_packages: Option<Json<Vec<BuiltPackage>>>,
    task_accepted_time: Option<DateTime<Utc>>,
    project_event: Json<ProjectEventRef>,
}

fn parse_status(raw: &str) -> DbResult<BuildStatus> {
    raw.parse().map_err(DbError::Serialization)
}

impl TryFrom<SrpmBuildRow> for SrpmBuildRecord {
    type Error = DbError;

    fn try_from(row: SrpmBuildRow) -> DbResult<Self> {
        Ok(SrpmBuildRecord {
            id: row.id,
            build_id: row.build_id,
            status: parse_status(&row.status)?,
            url: row.url,
            logs_url: row.logs_url,
            web_url: row.web_url,
            build_start_time: row.build_start_time,
            build_finished_time: row.build_finished_time,
            project_event: row.project_event.0,
        })
    }
}

impl TryFrom<BuildTargetRow> for BuildTargetRecord {
    type Error = DbError;

    fn try_from(row: BuildTargetRow) -> DbResult<Self> {
        Ok(BuildTargetRecord {
            id: row.id,
            build_id: row.build_id,
            srpm_build_id: row.srpm_build_id,
            target: row.target,
            owner: row.owner,
            project_name: row.project_name,
            status: parse_status(&row.status)?,
            web_url: row.web_url,
            build_logs_url: row.build_logs_url,
            build_start_time: row.build_start_time,
            build_finished_time: row.build_finished_time,
            built_packages: row.built_packages.map(|p| p.0),
            task_accepted_time: row.task_accepted_time,
            project_event: row.project_event.0,
        })
    }
}

fn srpm_column(field: &BuildField) -> Option<&'static str> {
    match field {
        BuildField::Status(_) => Some("status"),
        BuildField::BuildId(_) => Some("build_id"),
        BuildField::StartTime(_) => Some("build_start_time"),
        BuildField::EndTime(_) => Some("build_finished_time"),
        BuildField::LogsUrl(_) => Some("logs_url"),
        BuildField::Url(_) => Some("url"),
        BuildField::WebUrl(_) => Some("web_url"),
        BuildField::BuiltPackages(_) => None,
    }
}

fn target_column(field: &BuildField) -> Option<&'static str> {
    match field {
        BuildField::Status(_) => Some("status"),
        BuildField::BuildId(_) => Some("build_id"),
        BuildField::StartTime(_) => Some("build_start_time"),
        BuildField::EndTime(_) => Some("build_finished_time"),
        BuildField::LogsUrl(_) => Some("build_logs_url"),
        BuildField::WebUrl(_) => Some("web_url"),
        BuildField::BuiltPackages(_) => Some("built_packages"),
        BuildField::Url(_) => None,
    }
}

/// PostgreSQL implementation of [`BuildStore`].
pub struct PgBuildRepo {
    pool: PgPool,
}

impl PgBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_field(
        &self,
        table: &str,
        column: &str,
        id: i64,
        field: BuildField,
    ) -> DbResult<()> {
        let sql = format!("UPDATE {} SET {} = $2 WHERE id = $1", table, column);
        let query = sqlx::query(&sql).bind(id);
        let query = match field {
            BuildField::Status(status) => query.bind(status.to_string()),
            BuildField::BuildId(value)
            | BuildField::LogsUrl(value)
            | BuildField::Url(value)
            | BuildField::WebUrl(value) => query.bind(value),
            BuildField::StartTime(at) | BuildField::EndTime(at) => query.bind(at),
            BuildField::BuiltPackages(packages) => query.bind(Json(packages)),
        };

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            warn!(table, id, column, "No record to update");
            return Err(DbError::NotFound(format!("{} {}", table, id)));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildStore for PgBuildRepo {
    async fn create_srpm_build(
        &self,
        new: NewSrpmBuild,
    ) -> buildhook_core::Result<SrpmBuildRecord> {
        let row = sqlx::query_as::<_, SrpmBuildRow>(
            r#"
            INSERT INTO srpm_builds (build_id, status, web_url, project_event, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(new.build_id)
        .bind(new.status.to_string())
        .bind(new.web_url)
        .bind(Json(new.project_event))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;
        debug!(id = row.id, "SRPM build record created");
        Ok(SrpmBuildRecord::try_from(row)?)
    }

    async fn create_build_target(
        &self,
        new: NewBuildTarget,
    ) -> buildhook_core::Result<BuildTargetRecord> {
        let row = sqlx::query_as::<_, BuildTargetRow>(
            r#"
            INSERT INTO build_targets (
                build_id, srpm_build_id, target, owner, project_name, status,
                web_url, task_accepted_time, commit_sha, project_event, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            RETURNING *
            "#,
        )
        .bind(new.build_id)
        .bind(new.srpm_build_id)
        .bind(new.target)
        .bind(new.owner)
        .bind(new.project_name)
        .bind(new.status.to_string())
        .bind(new.web_url)
        .bind(new.task_accepted_time)
        .bind(new.project_event.commit_sha.clone())
        .bind(Json(new.project_event))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;
        debug!(id = row.id, target = %row.target, "Build target record created");
        Ok(BuildTargetRecord::try_from(row)?)
    }

    async fn get_srpm_build(&self, id: i64) -> buildhook_core::Result<Option<SrpmBuildRecord>> {
        let row = sqlx::query_as::<_, SrpmBuildRow>("SELECT * FROM srpm_builds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.map(SrpmBuildRecord::try_from).transpose()?)
    }

    async fn get_srpm_build_by_build_id(
        &self,
        build_id: &str,
    ) -> buildhook_core::Result<Option<SrpmBuildRecord>> {
        let row = sqlx::query_as::<_, SrpmBuildRow>(
            "SELECT * FROM srpm_builds WHERE build_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(build_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(row.map(SrpmBuildRecord::try_from).transpose()?)
    }

    async fn get_build_target(
        &self,
        build_id: &str,
        target: &str,
    ) -> buildhook_core::Result<Option<BuildTargetRecord>> {
        let row = sqlx::query_as::<_, BuildTargetRow>(
            "SELECT * FROM build_targets WHERE build_id = $1 AND target = $2",
        )
        .bind(build_id)
        .bind(target)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(row.map(BuildTargetRecord::try_from).transpose()?)
    }

    async fn get_all_by_build_id(
        &self,
        build_id: &str,
    ) -> buildhook_core::Result<Vec<BuildTargetRecord>> {
        let rows = sqlx::query_as::<_, BuildTargetRow>(
            "SELECT * FROM build_targets WHERE build_id = $1 ORDER BY id",
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| BuildTargetRecord::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn get_all_by(
        &self,
        filter: &BuildFilter,
    ) -> buildhook_core::Result<Vec<BuildTargetRecord>> {
        let rows = sqlx::query_as::<_, BuildTargetRow>(
            r#"
            SELECT * FROM build_targets
            WHERE ($1::TEXT IS NULL OR commit_sha = $1)
              AND ($2::TEXT IS NULL OR project_name = $2)
              AND ($3::TEXT IS NULL OR owner = $3)
              AND ($4::TEXT IS NULL OR target = $4)
              AND ($5::TEXT IS NULL OR status = $5)
            ORDER BY id DESC
            "#,
        )
        .bind(filter.commit_sha.as_deref())
        .bind(filter.project_name.as_deref())
        .bind(filter.owner.as_deref())
        .bind(filter.target.as_deref())
        .bind(filter.status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| BuildTargetRecord::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn update_srpm_build(&self, id: i64, field: BuildField) -> buildhook_core::Result<()> {
        match srpm_column(&field) {
            Some(column) => Ok(self.update_field("srpm_builds", column, id, field).await?),
            None => Ok(()),
        }
    }

    async fn update_build_target(&self, id: i64, field: BuildField) -> buildhook_core::Result<()> {
        match target_column(&field) {
            Some(column) => Ok(self.update_field("build_targets", column, id, field).await?),
            None => Ok(()),
        }
    }
}
