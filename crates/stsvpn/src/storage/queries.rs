//! Tunnel queries.

use stsvpn_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{Tunnel, TunnelRow, TunnelRules};

impl Database {
    /// List all tunnels in insertion order.
    pub async fn list_tunnels(&self) -> Result<Vec<Tunnel>, DatabaseError> {
        let rows = sqlx::query_as::<_, TunnelRow>("SELECT * FROM tunnels ORDER BY id ASC")
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Tunnel::try_from).collect()
    }

    /// Get a tunnel by ID.
    pub async fn get_tunnel(&self, id: i64) -> Result<Tunnel, DatabaseError> {
        sqlx::query_as::<_, TunnelRow>("SELECT * FROM tunnels WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Tunnel {id}")))
            .and_then(Tunnel::try_from)
    }

    /// Get a tunnel by its connection name.
    pub async fn get_tunnel_by_name(&self, name: &str) -> Result<Option<Tunnel>, DatabaseError> {
        sqlx::query_as::<_, TunnelRow>("SELECT * FROM tunnels WHERE name = ?")
            .bind(name)
            .fetch_optional(self.pool())
            .await?
            .map(Tunnel::try_from)
            .transpose()
    }

    /// Create a tunnel, or update it in place when `id` names an existing row.
    ///
    /// Runs in a single transaction; on error the transaction is dropped and
    /// rolled back, leaving the row as it was.
    pub async fn upsert_tunnel(
        &self,
        id: Option<i64>,
        name: &str,
        rules: &TunnelRules,
        psk: &str,
    ) -> Result<Tunnel, DatabaseError> {
        let rules_json =
            serde_json::to_string(rules).map_err(|e| DatabaseError::Query(e.to_string()))?;
        let now = unix_timestamp();

        let mut tx = self.pool().begin().await?;

        let existing = match id {
            Some(id) => {
                sqlx::query_scalar::<_, i64>("SELECT id FROM tunnels WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };

        let id = if let Some(id) = existing {
            sqlx::query("UPDATE tunnels SET name = ?, rules = ?, psk = ?, updated_at = ? WHERE id = ?")
                .bind(name)
                .bind(&rules_json)
                .bind(psk)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tracing::debug!(tunnel_id = id, tunnel = %name, "Tunnel updated");
            id
        } else {
            let result = sqlx::query(
                "INSERT INTO tunnels (name, psk, rules, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(psk)
            .bind(&rules_json)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let id = result.last_insert_rowid();
            tracing::debug!(tunnel_id = id, tunnel = %name, "Tunnel created");
            id
        };

        tx.commit().await?;

        self.get_tunnel(id).await
    }

    /// Delete a tunnel.
    pub async fn delete_tunnel(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM tunnels WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Tunnel {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AuthMethod, StartMode};

    fn rules(name: &str) -> TunnelRules {
        TunnelRules {
            auto: StartMode::Start,
            esp: "aes128-sha1".into(),
            left: "10.0.0.1".into(),
            leftsubnet: "10.0.0.0/24".into(),
            leftid: name.into(),
            right: "10.1.0.1".into(),
            rightsubnet: "10.1.0.0/24".into(),
            rightid: name.into(),
            authby: AuthMethod::Secret,
        }
    }

    #[tokio::test]
    async fn create_and_get_tunnel() {
        let db = Database::open_in_memory().await.unwrap();

        let created = db
            .upsert_tunnel(None, "branch-a", &rules("branch-a"), "s3cr3t")
            .await
            .unwrap();
        let fetched = db.get_tunnel(created.id).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.name, "branch-a");
        assert_eq!(fetched.psk, "s3cr3t");
        assert_eq!(fetched.rules, rules("branch-a"));
    }

    #[tokio::test]
    async fn upsert_with_existing_id_updates_in_place() {
        let db = Database::open_in_memory().await.unwrap();
        let created = db
            .upsert_tunnel(None, "branch-a", &rules("branch-a"), "old")
            .await
            .unwrap();

        let updated = db
            .upsert_tunnel(Some(created.id), "branch-b", &rules("branch-b"), "new")
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "branch-b");
        assert_eq!(updated.psk, "new");
        assert_eq!(db.list_tunnels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_with_unknown_id_creates() {
        let db = Database::open_in_memory().await.unwrap();

        let created = db
            .upsert_tunnel(Some(42), "branch-a", &rules("branch-a"), "s3cr3t")
            .await
            .unwrap();

        assert_eq!(db.list_tunnels().await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn duplicate_name_conflicts_and_leaves_rows_unchanged() {
        let db = Database::open_in_memory().await.unwrap();
        let a = db
            .upsert_tunnel(None, "branch-a", &rules("branch-a"), "a")
            .await
            .unwrap();
        let b = db
            .upsert_tunnel(None, "branch-b", &rules("branch-b"), "b")
            .await
            .unwrap();

        let err = db
            .upsert_tunnel(Some(b.id), "branch-a", &rules("branch-a"), "changed")
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Conflict(_)), "got {err:?}");
        assert_eq!(db.get_tunnel(b.id).await.unwrap(), b);
        assert_eq!(db.get_tunnel(a.id).await.unwrap(), a);
    }

    #[tokio::test]
    async fn list_is_in_insertion_order() {
        let db = Database::open_in_memory().await.unwrap();
        for name in ["zulu", "alpha", "mike"] {
            db.upsert_tunnel(None, name, &rules(name), "k").await.unwrap();
        }

        let names: Vec<_> = db
            .list_tunnels()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();

        assert_eq!(names, ["zulu", "alpha", "mike"]);
    }

    #[tokio::test]
    async fn get_by_name() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_tunnel(None, "branch-a", &rules("branch-a"), "k")
            .await
            .unwrap();

        assert!(db.get_tunnel_by_name("branch-a").await.unwrap().is_some());
        assert!(db.get_tunnel_by_name("branch-z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let db = Database::open_in_memory().await.unwrap();
        let tunnel = db
            .upsert_tunnel(None, "branch-a", &rules("branch-a"), "k")
            .await
            .unwrap();

        db.delete_tunnel(tunnel.id).await.unwrap();

        assert!(matches!(
            db.get_tunnel(tunnel.id).await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(
            db.delete_tunnel(tunnel.id).await,
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_rules_surface_as_error() {
        let db = Database::open_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO tunnels (name, psk, rules, created_at, updated_at) VALUES ('x', 'k', 'not json', 0, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(matches!(
            db.list_tunnels().await,
            Err(DatabaseError::Corrupt(_))
        ));
    }
}
