//! SQLite identity directory: permissions, roles, users and API tokens.

use chrono::Utc;
use signoff_core::repository::directory::DirectoryRepository;
use signoff_types::directory::{Permission, Role, User};
use signoff_types::error::RepositoryError;
use signoff_types::id::{PermissionId, RoleId, UserId};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, map_unique, parse_datetime, parse_id, query_err};

pub struct SqliteDirectoryRepository {
    pool: DatabasePool,
}

impl SqliteDirectoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn role_permission_ids(&self, role_id: &str) -> Result<Vec<PermissionId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT permission_id FROM role_permissions WHERE role_id = ? ORDER BY permission_id",
        )
        .bind(role_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        ids.iter().map(|s| parse_id("permission", s)).collect()
    }

    async fn user_role_ids(&self, user_id: &str) -> Result<Vec<RoleId>, RepositoryError> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT role_id FROM user_roles WHERE user_id = ? ORDER BY role_id")
                .bind(user_id)
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_err)?;

        ids.iter().map(|s| parse_id("role", s)).collect()
    }

    async fn hydrate_role(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Role, RepositoryError> {
        let id: String = row.try_get("id").map_err(query_err)?;
        let created_at: String = row.try_get("created_at").map_err(query_err)?;
        Ok(Role {
            permission_ids: self.role_permission_ids(&id).await?,
            id: parse_id("role", &id)?,
            name: row.try_get("name").map_err(query_err)?,
            description: row.try_get("description").map_err(query_err)?,
            created_at: parse_datetime(&created_at)?,
        })
    }

    async fn hydrate_user(&self, row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
        let id: String = row.try_get("id").map_err(query_err)?;
        let created_at: String = row.try_get("created_at").map_err(query_err)?;
        Ok(User {
            role_ids: self.user_role_ids(&id).await?,
            id: parse_id("user", &id)?,
            username: row.try_get("username").map_err(query_err)?,
            full_name: row.try_get("full_name").map_err(query_err)?,
            is_active: row.try_get("is_active").map_err(query_err)?,
            created_at: parse_datetime(&created_at)?,
        })
    }

    async fn fetch_user(&self, sql: &str, key: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(sql)
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(self.hydrate_user(&row).await?)),
            None => Ok(None),
        }
    }
}

fn permission_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Permission, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Permission {
        id: parse_id("permission", &id)?,
        name: row.try_get("name").map_err(query_err)?,
        resource: row.try_get("resource").map_err(query_err)?,
        action: row.try_get("action").map_err(query_err)?,
        description: row.try_get("description").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl DirectoryRepository for SqliteDirectoryRepository {
    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    async fn create_permission(&self, permission: &Permission) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO permissions (id, name, resource, action, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(permission.id.to_string())
        .bind(&permission.name)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(&permission.description)
        .bind(format_datetime(&permission.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_unique(e, || format!("permission '{}' already exists", permission.name)))?;
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM permissions ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        rows.iter().map(permission_from_row).collect()
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM permissions WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        row.as_ref().map(permission_from_row).transpose()
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    async fn create_role(&self, role: &Role) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query("INSERT INTO roles (id, name, description, created_at) VALUES (?, ?, ?, ?)")
            .bind(role.id.to_string())
            .bind(&role.name)
            .bind(&role.description)
            .bind(format_datetime(&role.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique(e, || format!("role '{}' already exists", role.name)))?;

        for permission_id in &role.permission_ids {
            sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
                .bind(role.id.to_string())
                .bind(permission_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM roles ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in &rows {
            roles.push(self.hydrate_role(row).await?);
        }
        Ok(roles)
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(self.hydrate_role(&row).await?)),
            None => Ok(None),
        }
    }

    async fn grant_permission(
        &self,
        role_id: &RoleId,
        permission_id: &PermissionId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
            .bind(role_id.to_string())
            .bind(permission_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO users (id, username, full_name, is_active, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(user.is_active)
        .bind(format_datetime(&user.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, || format!("user '{}' already exists", user.username)))?;

        for role_id in &user.role_ids {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user.id.to_string())
                .bind(role_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY username ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            users.push(self.hydrate_user(row).await?);
        }
        Ok(users)
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.fetch_user("SELECT * FROM users WHERE id = ?", &id.to_string())
            .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_user("SELECT * FROM users WHERE username = ?", username)
            .await
    }

    async fn assign_role(&self, user_id: &UserId, role_id: &RoleId) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(role_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn permissions_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionId>, RepositoryError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; role_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT permission_id FROM role_permissions
             WHERE role_id IN ({placeholders}) ORDER BY permission_id"
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for role_id in role_ids {
            query = query.bind(role_id.to_string());
        }
        let ids = query.fetch_all(&self.pool.reader).await.map_err(query_err)?;

        ids.iter().map(|s| parse_id("permission", s)).collect()
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    async fn store_token(
        &self,
        user_id: &UserId,
        token_hash: &str,
        label: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO api_tokens (token_hash, user_id, label, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(user_id.to_string())
        .bind(label)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_unique(e, || "token already issued".to_string()))?;
        Ok(())
    }

    async fn find_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_user(
            "SELECT u.* FROM users u
             JOIN api_tokens t ON t.user_id = u.id
             WHERE t.token_hash = ? AND u.is_active = 1",
            token_hash,
        )
        .await
    }
}
