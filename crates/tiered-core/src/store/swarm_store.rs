use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::TierError;
use crate::models::swarm::{ResourceUsage, Swarm, SwarmStatus, TeamMember};

const SWARM_COLUMNS: &str = "id, name, goal, resources, config, user_id, parent_swarm_id, \
                             status, usage, team, created_at, updated_at";

pub struct SwarmStore {
    db: Database,
}

impl SwarmStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert the swarm unless a record with its id already exists.
    /// Returns `true` when this call created the record.
    pub async fn create_if_absent(&self, swarm: &Swarm) -> Result<bool, TierError> {
        let s = swarm.clone();
        self.db
            .with_conn_async(move |conn| {
                let inserted = conn.execute(
                    "INSERT INTO swarms (id, name, goal, resources, config, user_id, parent_swarm_id,
                                         status, usage, team, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(id) DO NOTHING",
                    rusqlite::params![
                        s.swarm_id,
                        s.name,
                        s.goal,
                        serde_json::to_string(&s.resources).unwrap_or_default(),
                        serde_json::to_string(&s.config).unwrap_or_default(),
                        s.user_id,
                        s.parent_swarm_id,
                        s.status.as_str(),
                        serde_json::to_string(&s.usage).unwrap_or_default(),
                        serde_json::to_string(&s.team).unwrap_or_default(),
                        s.created_at.timestamp_millis(),
                        s.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(inserted == 1)
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Swarm>, TierError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM swarms WHERE id = ?1", SWARM_COLUMNS))?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_swarm(row)))
                    .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Swarm>, TierError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM swarms ORDER BY created_at DESC",
                    SWARM_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_swarm(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<Swarm>, TierError> {
        let parent_id = parent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM swarms WHERE parent_swarm_id = ?1 ORDER BY created_at ASC",
                    SWARM_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![parent_id], |row| Ok(row_to_swarm(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Returns `false` when no swarm has the id.
    pub async fn update_status(&self, id: &str, status: SwarmStatus) -> Result<bool, TierError> {
        let id = id.to_string();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE swarms SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![status.as_str(), now, id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn update_usage(&self, id: &str, usage: &ResourceUsage) -> Result<bool, TierError> {
        let id = id.to_string();
        let usage_json = serde_json::to_string(usage).unwrap_or_default();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE swarms SET usage = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![usage_json, now, id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn update_team(&self, id: &str, team: &[TeamMember]) -> Result<bool, TierError> {
        let id = id.to_string();
        let team_json = serde_json::to_string(team).unwrap_or_default();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE swarms SET team = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![team_json, now, id],
                )?;
                Ok(changed > 0)
            })
            .await
    }
}

fn row_to_swarm(row: &Row<'_>) -> Swarm {
    let json_col = |idx: usize| row.get::<_, String>(idx).unwrap_or_default();
    let created_ms: i64 = row.get(10).unwrap_or(0);
    let updated_ms: i64 = row.get(11).unwrap_or(0);

    Swarm {
        swarm_id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        goal: row.get(2).unwrap_or_default(),
        resources: serde_json::from_str(&json_col(3)).unwrap_or_else(|_| {
            crate::config::CoordinatorConfig::default().default_resources
        }),
        config: serde_json::from_str(&json_col(4)).unwrap_or_else(|_| {
            crate::config::CoordinatorConfig::default().default_swarm_config
        }),
        user_id: row.get(5).unwrap_or_default(),
        parent_swarm_id: row.get(6).unwrap_or(None),
        status: SwarmStatus::from_str(&json_col(7)).unwrap_or(SwarmStatus::Pending),
        usage: serde_json::from_str(&json_col(8)).unwrap_or_default(),
        team: serde_json::from_str(&json_col(9)).unwrap_or_default(),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms).unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;

    fn swarm(id: &str, parent: Option<&str>) -> Swarm {
        let defaults = CoordinatorConfig::default();
        Swarm::new(
            id.to_string(),
            format!("swarm {}", id),
            "goal".to_string(),
            defaults.default_resources,
            defaults.default_swarm_config,
            "user-1".to_string(),
            parent.map(String::from),
        )
    }

    #[tokio::test]
    async fn test_create_if_absent_only_inserts_once() {
        let store = SwarmStore::new(Database::open_in_memory().unwrap());
        assert!(store.create_if_absent(&swarm("s1", None)).await.unwrap());

        let mut again = swarm("s1", None);
        again.goal = "different".to_string();
        assert!(!store.create_if_absent(&again).await.unwrap());

        let stored = store.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.goal, "goal");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_updates_round_trip() {
        let store = SwarmStore::new(Database::open_in_memory().unwrap());
        store.create_if_absent(&swarm("s1", None)).await.unwrap();

        assert!(store.update_status("s1", SwarmStatus::Paused).await.unwrap());
        let usage = ResourceUsage { credits: 3, tokens: 40, elapsed_ms: 500 };
        assert!(store.update_usage("s1", &usage).await.unwrap());
        let team = vec![TeamMember { agent_id: "a1".to_string(), role: "lead".to_string() }];
        assert!(store.update_team("s1", &team).await.unwrap());

        let stored = store.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SwarmStatus::Paused);
        assert_eq!(stored.usage, usage);
        assert_eq!(stored.team, team);

        assert!(!store.update_status("missing", SwarmStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_children() {
        let store = SwarmStore::new(Database::open_in_memory().unwrap());
        store.create_if_absent(&swarm("root", None)).await.unwrap();
        store.create_if_absent(&swarm("c1", Some("root"))).await.unwrap();
        store.create_if_absent(&swarm("c2", Some("root"))).await.unwrap();
        store.create_if_absent(&swarm("other", None)).await.unwrap();

        let children = store.list_children("root").await.unwrap();
        let ids: Vec<_> = children.iter().map(|s| s.swarm_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"c1") && ids.contains(&"c2"));
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
