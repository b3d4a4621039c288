// db/projectdb.rs
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use uuid::Uuid;

use super::{
    db::DBClient,
    listing::{AccountabilityQuery, ProjectQuery, ACCOUNTABILITY_SELECT, PROJECT_SELECT},
};
use crate::models::projectmodel::{
    Accountability, AccountabilityStatus, AccountabilityWithRelations, Comment, CommentWithAuthor,
    Project, ProjectStatus, ProjectWithRelations,
};

const COMMENT_SELECT: &str = r#"
    SELECT cm.*,
        u.email AS author_email,
        u.nom AS author_nom,
        u.prenom AS author_prenom
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
"#;

#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub commune_id: i32,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<BigDecimal>,
    pub avancement: i32,
    pub created_by: Uuid,
}

#[async_trait]
pub trait ProjectExt {
    async fn create_project(&self, new: NewProject) -> Result<Project, sqlx::Error>;

    async fn get_project(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectWithRelations>, sqlx::Error>;

    async fn get_projects(
        &self,
        query: &ProjectQuery,
    ) -> Result<Vec<ProjectWithRelations>, sqlx::Error>;

    /// Row-locked read-modify-write of a project. `apply` sees the locked
    /// row, so commune checks and date checks run against what is written.
    async fn update_project_with<F, E>(
        &self,
        project_id: Uuid,
        apply: F,
    ) -> Result<Option<Project>, E>
    where
        F: FnOnce(&mut Project) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send;

    /// Points the project at a new file reference and hands back the one it
    /// replaced, so the caller can remove it once the row is committed.
    async fn replace_project_file(
        &self,
        project_id: Uuid,
        file: String,
    ) -> Result<Option<Option<String>>, sqlx::Error>;

    /// Deletes the project (comments and accountability cascade) and returns
    /// the removed row.
    async fn delete_project(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error>;

    async fn create_comment(
        &self,
        project_id: Uuid,
        author_id: Uuid,
        text: String,
    ) -> Result<Comment, sqlx::Error>;

    async fn get_comments(&self, project_id: Uuid) -> Result<Vec<CommentWithAuthor>, sqlx::Error>;

    async fn get_comment(
        &self,
        project_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<CommentWithAuthor>, sqlx::Error>;

    async fn update_comment(
        &self,
        comment_id: Uuid,
        text: String,
    ) -> Result<Option<Comment>, sqlx::Error>;

    async fn delete_comment(&self, comment_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn create_accountability(
        &self,
        project_id: Uuid,
        citizen_id: Uuid,
        question: String,
    ) -> Result<Accountability, sqlx::Error>;

    async fn get_accountability(
        &self,
        accountability_id: Uuid,
    ) -> Result<Option<AccountabilityWithRelations>, sqlx::Error>;

    async fn get_accountabilities(
        &self,
        query: &AccountabilityQuery,
    ) -> Result<Vec<AccountabilityWithRelations>, sqlx::Error>;

    /// Row-locked read-modify-write of an accountability request.
    async fn update_accountability_with<F, E>(
        &self,
        accountability_id: Uuid,
        apply: F,
    ) -> Result<Option<Accountability>, E>
    where
        F: FnOnce(&mut Accountability) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send;
}

#[async_trait]
impl ProjectExt for DBClient {
    async fn create_project(&self, new: NewProject) -> Result<Project, sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (
                title, description, commune_id, status, start_date, end_date,
                budget, avancement, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new.title)
        .bind(new.description)
        .bind(new.commune_id)
        .bind(new.status)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.budget)
        .bind(new.avancement)
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(project)
    }

    async fn get_project(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectWithRelations>, sqlx::Error> {
        let project = sqlx::query_as::<_, ProjectWithRelations>(&format!(
            "{} WHERE p.id = $1",
            PROJECT_SELECT
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(project)
    }

    async fn get_projects(
        &self,
        query: &ProjectQuery,
    ) -> Result<Vec<ProjectWithRelations>, sqlx::Error> {
        let mut builder = query.build();
        let projects = builder
            .build_query_as::<ProjectWithRelations>()
            .fetch_all(&self.pool)
            .await?;

        Ok(projects)
    }

    async fn update_project_with<F, E>(
        &self,
        project_id: Uuid,
        apply: F,
    ) -> Result<Option<Project>, E>
    where
        F: FnOnce(&mut Project) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Project>(
            r#"SELECT * FROM projects WHERE id = $1 FOR UPDATE"#,
        )
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut project) = current else {
            return Ok(None);
        };

        apply(&mut project)?;

        let updated = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET title = $2,
                description = $3,
                commune_id = $4,
                status = $5,
                start_date = $6,
                end_date = $7,
                budget = $8,
                avancement = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(project.id)
        .bind(project.title)
        .bind(project.description)
        .bind(project.commune_id)
        .bind(project.status)
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.budget)
        .bind(project.avancement)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn replace_project_file(
        &self,
        project_id: Uuid,
        file: String,
    ) -> Result<Option<Option<String>>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<(Option<String>,)> =
            sqlx::query_as(r#"SELECT file FROM projects WHERE id = $1 FOR UPDATE"#)
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((previous,)) = previous else {
            return Ok(None);
        };

        sqlx::query(r#"UPDATE projects SET file = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(project_id)
            .bind(file)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(previous))
    }

    async fn delete_project(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"DELETE FROM projects WHERE id = $1 RETURNING *"#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(project)
    }

    async fn create_comment(
        &self,
        project_id: Uuid,
        author_id: Uuid,
        text: String,
    ) -> Result<Comment, sqlx::Error> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (project_id, author_id, text)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn get_comments(&self, project_id: Uuid) -> Result<Vec<CommentWithAuthor>, sqlx::Error> {
        let comments = sqlx::query_as::<_, CommentWithAuthor>(&format!(
            "{} WHERE cm.project_id = $1 ORDER BY cm.created_at DESC",
            COMMENT_SELECT
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    async fn get_comment(
        &self,
        project_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<CommentWithAuthor>, sqlx::Error> {
        let comment = sqlx::query_as::<_, CommentWithAuthor>(&format!(
            "{} WHERE cm.project_id = $1 AND cm.id = $2",
            COMMENT_SELECT
        ))
        .bind(project_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn update_comment(
        &self,
        comment_id: Uuid,
        text: String,
    ) -> Result<Option<Comment>, sqlx::Error> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            UPDATE comments
            SET text = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(comment_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM comments WHERE id = $1"#)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_accountability(
        &self,
        project_id: Uuid,
        citizen_id: Uuid,
        question: String,
    ) -> Result<Accountability, sqlx::Error> {
        let accountability = sqlx::query_as::<_, Accountability>(
            r#"
            INSERT INTO accountability (project_id, citizen_id, question, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(citizen_id)
        .bind(question)
        .bind(AccountabilityStatus::Pending)
        .fetch_one(&self.pool)
        .await?;

        Ok(accountability)
    }

    async fn get_accountability(
        &self,
        accountability_id: Uuid,
    ) -> Result<Option<AccountabilityWithRelations>, sqlx::Error> {
        let accountability = sqlx::query_as::<_, AccountabilityWithRelations>(&format!(
            "{} WHERE a.id = $1",
            ACCOUNTABILITY_SELECT
        ))
        .bind(accountability_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(accountability)
    }

    async fn get_accountabilities(
        &self,
        query: &AccountabilityQuery,
    ) -> Result<Vec<AccountabilityWithRelations>, sqlx::Error> {
        let mut builder = query.build();
        let rows = builder
            .build_query_as::<AccountabilityWithRelations>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn update_accountability_with<F, E>(
        &self,
        accountability_id: Uuid,
        apply: F,
    ) -> Result<Option<Accountability>, E>
    where
        F: FnOnce(&mut Accountability) -> Result<(), E> + Send,
        E: From<sqlx::Error> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Accountability>(
            r#"SELECT * FROM accountability WHERE id = $1 FOR UPDATE"#,
        )
        .bind(accountability_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut accountability) = current else {
            return Ok(None);
        };

        apply(&mut accountability)?;

        let updated = sqlx::query_as::<_, Accountability>(
            r#"
            UPDATE accountability
            SET response = $2,
                status = $3,
                responded_by = $4,
                responded_at = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(accountability.id)
        .bind(accountability.response)
        .bind(accountability.status)
        .bind(accountability.responded_by)
        .bind(accountability.responded_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }
}
