// No FOREIGN KEY on posts.gallery_id: posts may be stored before their gallery is synced.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS galleries (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        url TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        gallery_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        link TEXT NOT NULL,
        writer TEXT NOT NULL,
        date TEXT NOT NULL,
        views INTEGER NOT NULL DEFAULT 0,
        comments INTEGER NOT NULL DEFAULT 0,
        recommendations INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_posts_gallery_link ON posts (gallery_id, link);
";
