// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot connection records.

use botfleet_core::{BotConnection, BotId, FleetError};
use rusqlite::{Row, params};

use super::{from_millis, to_millis};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, name, token, desired_enabled, webhook_url, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<BotConnection> {
    Ok(BotConnection {
        id: BotId(row.get(0)?),
        name: row.get(1)?,
        token: row.get(2)?,
        desired_enabled: row.get(3)?,
        webhook_url: row.get(4)?,
        created_at: from_millis(5, row.get(5)?)?,
        updated_at: from_millis(6, row.get(6)?)?,
    })
}

/// All bots in registration order.
pub async fn load_all(db: &Database) -> Result<Vec<BotConnection>, FleetError> {
    db.connection()
        .call(|conn| -> Result<Vec<BotConnection>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM bots ORDER BY rowid"))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &BotId) -> Result<Option<BotConnection>, FleetError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<BotConnection>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM bots WHERE id = ?1"))?;
            let mut rows = stmt.query_map(params![id], from_row)?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or update a bot. Updates keep the original rowid, so the
/// registration order survives.
pub async fn save(db: &Database, bot: &BotConnection) -> Result<(), FleetError> {
    let bot = bot.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO bots (id, name, token, desired_enabled, webhook_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    token = excluded.token,
                    desired_enabled = excluded.desired_enabled,
                    webhook_url = excluded.webhook_url,
                    updated_at = excluded.updated_at",
                params![
                    bot.id.0,
                    bot.name,
                    bot.token,
                    bot.desired_enabled,
                    bot.webhook_url,
                    to_millis(bot.created_at),
                    to_millis(bot.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a bot. Deleting an absent id is not an error.
pub async fn delete(db: &Database, id: &BotId) -> Result<bool, FleetError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute("DELETE FROM bots WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_core::BotConfig;
    use chrono::{TimeZone, Utc};

    fn bot(id: &str) -> BotConnection {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        BotConnection::from_config(BotConfig::new(id, id.to_uppercase(), "1:secret"), at)
    }

    #[tokio::test]
    async fn save_and_load_preserve_order() {
        let db = Database::open_in_memory().await.unwrap();
        for id in ["charlie", "alpha", "bravo"] {
            save(&db, &bot(id)).await.unwrap();
        }
        let ids: Vec<String> = load_all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id.0)
            .collect();
        assert_eq!(ids, vec!["charlie", "alpha", "bravo"]);
    }

    #[tokio::test]
    async fn upsert_keeps_position_and_updates_fields() {
        let db = Database::open_in_memory().await.unwrap();
        save(&db, &bot("alpha")).await.unwrap();
        save(&db, &bot("bravo")).await.unwrap();

        let mut alpha = bot("alpha");
        alpha.desired_enabled = true;
        alpha.webhook_url = Some("https://example.org/hook".into());
        save(&db, &alpha).await.unwrap();

        let all = load_all(&db).await.unwrap();
        assert_eq!(all[0].id.as_str(), "alpha");
        assert!(all[0].desired_enabled);
        assert_eq!(all[0].webhook_url.as_deref(), Some("https://example.org/hook"));
        assert_eq!(all[0].created_at, bot("alpha").created_at);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let db = Database::open_in_memory().await.unwrap();
        save(&db, &bot("alpha")).await.unwrap();
        assert!(delete(&db, &BotId::from("alpha")).await.unwrap());
        assert!(!delete(&db, &BotId::from("alpha")).await.unwrap());
        assert!(get(&db, &BotId::from("alpha")).await.unwrap().is_none());
    }
}
