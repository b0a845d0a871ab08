use std::path::Path;
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use anyhow::{Result, Context};
use tracing::debug;

use crate::database::schema::SCHEMA;
use crate::registry::galleries::{Gallery, GalleryId};

/// One harvested listing row. `id` is assigned by the store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: Option<i64>,
    pub gallery_id: GalleryId,
    pub title: String,
    pub link: String,
    pub writer: String,
    pub date: String,
    pub views: u32,
    pub comments: u32,
    pub recommendations: u32,
}

/// What to do with a post whose `(gallery_id, link)` is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPolicy {
    /// Always append; re-listed posts become duplicate rows.
    #[default]
    Append,
    SkipExisting,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).context("Failed to open database")?;
        // WAL lets readers proceed while the collector holds a write transaction.
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        debug!("Journal mode: {}", mode);
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA).context("Failed to initialize schema")
    }

    /// Persists the configured galleries; ids already present are left untouched.
    pub fn sync_galleries(&mut self, galleries: &[Gallery]) -> Result<usize> {
        let tx = self.conn.transaction().context("Failed to begin transaction")?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO galleries (id, name, url) VALUES (?1, ?2, ?3)")?;
            for gallery in galleries {
                inserted += stmt.execute(params![gallery.id, gallery.name, gallery.url])?;
            }
        }
        tx.commit().context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Appends one gallery's batch atomically. Returns the number of rows written.
    pub fn insert_posts(&mut self, posts: &[Post], policy: InsertPolicy) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }

        // One transaction per batch: a failing row rolls back the whole gallery cycle.
        let tx = self.conn.transaction().context("Failed to begin transaction")?;
        let mut inserted = 0;
        {
            // SkipExisting counts 0 for a row the NOT EXISTS guard filtered out.
            let sql = match policy {
                InsertPolicy::Append => {
                    "INSERT INTO posts (gallery_id, title, link, writer, date, views, comments, recommendations)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                }
                InsertPolicy::SkipExisting => {
                    "INSERT INTO posts (gallery_id, title, link, writer, date, views, comments, recommendations)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                     WHERE NOT EXISTS (SELECT 1 FROM posts WHERE gallery_id = ?1 AND link = ?3)"
                }
            };
            let mut stmt = tx.prepare(sql)?;

            for post in posts {
                inserted += stmt
                    .execute(params![
                        post.gallery_id,
                        post.title,
                        post.link,
                        post.writer,
                        post.date,
                        post.views,
                        post.comments,
                        post.recommendations
                    ])
                    .context("Failed to insert post")?;
            }
        }

        tx.commit().context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// All posts in insertion order.
    pub fn all_posts(&self) -> Result<Vec<Post>> {
        // AUTOINCREMENT ids never go backwards, so id order is insertion order.
        let mut stmt = self.conn.prepare(
            "SELECT id, gallery_id, title, link, writer, date, views, comments, recommendations
             FROM posts ORDER BY id",
        )?;
        let rows = stmt.query_map([], post_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("Failed to read posts")
    }

    pub fn all_galleries(&self) -> Result<Vec<Gallery>> {
        let mut stmt = self.conn.prepare("SELECT id, name, url FROM galleries ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Gallery {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("Failed to read galleries")
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        gallery_id: row.get(1)?,
        title: row.get(2)?,
        link: row.get(3)?,
        writer: row.get(4)?,
        date: row.get(5)?,
        views: row.get(6)?,
        comments: row.get(7)?,
        recommendations: row.get(8)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn post(gallery_id: GalleryId, link: &str, views: u32, comments: u32, recommendations: u32) -> Post {
        Post {
            id: None,
            gallery_id,
            title: format!("title of {}", link),
            link: link.to_string(),
            writer: "writer".to_string(),
            date: "2024.05.01".to_string(),
            views,
            comments,
            recommendations,
        }
    }

    #[test]
    fn test_ensure_schema_is_idempotent() -> Result<()> {
        let store = Store::open_in_memory()?;
        store.ensure_schema()?;
        store.ensure_schema()?;
        assert!(store.all_posts()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_append_keeps_duplicates() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        let batch = vec![post(1, "https://site/a", 5, 1, 0)];

        assert_eq!(store.insert_posts(&batch, InsertPolicy::Append)?, 1);
        assert_eq!(store.insert_posts(&batch, InsertPolicy::Append)?, 1);

        let posts = store.all_posts()?;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, Some(1));
        assert_eq!(posts[1].id, Some(2));
        assert_eq!(posts[1].link, "https://site/a");
        Ok(())
    }

    #[test]
    fn test_skip_existing_ignores_known_links() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        store.insert_posts(&[post(1, "https://site/a", 5, 1, 0)], InsertPolicy::SkipExisting)?;

        let second = vec![
            post(1, "https://site/a", 9, 2, 0),
            post(1, "https://site/b", 3, 0, 0),
            post(2, "https://site/a", 1, 0, 0),
        ];
        assert_eq!(store.insert_posts(&second, InsertPolicy::SkipExisting)?, 2);

        let posts = store.all_posts()?;
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].views, 5);
        Ok(())
    }

    #[test]
    fn test_insert_for_unsynced_gallery_succeeds() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        assert!(store.all_galleries()?.is_empty());

        let batch = vec![post(42, "https://site/x", 1, 0, 0), post(42, "https://site/y", 2, 0, 0)];
        assert_eq!(store.insert_posts(&batch, InsertPolicy::Append)?, 2);

        let posts = store.all_posts()?;
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.gallery_id == 42));
        Ok(())
    }

    #[test]
    fn test_sync_galleries_is_insert_or_ignore() -> Result<()> {
        let mut store = Store::open_in_memory()?;
        let galleries = vec![
            Gallery { id: 2, name: "Soccer".into(), url: "https://site/soccer".into() },
            Gallery { id: 1, name: "Baseball".into(), url: "https://site/baseball".into() },
        ];

        assert_eq!(store.sync_galleries(&galleries)?, 2);
        assert_eq!(store.sync_galleries(&galleries)?, 0);

        let ids: Vec<_> = store.all_galleries()?.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_open_file_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pulse.db");
        {
            let mut store = Store::open(&path)?;
            store.insert_posts(&[post(1, "https://site/a", 1, 1, 1)], InsertPolicy::Append)?;
        }
        let reopened = Store::open(&path)?;
        assert_eq!(reopened.all_posts()?.len(), 1);
        Ok(())
    }
}
