pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS artifact_metadata (
        id INTEGER PRIMARY KEY,
        title TEXT,
        culture TEXT,
        period TEXT,
        century TEXT,
        medium TEXT,
        dimensions TEXT,
        description TEXT,
        department TEXT,
        classification TEXT,
        accessionyear INTEGER,
        accessionmethod TEXT
    );

    CREATE TABLE IF NOT EXISTS artifact_media (
        objectid INTEGER PRIMARY KEY,
        imagecount INTEGER,
        mediacount INTEGER,
        colorcount INTEGER,
        rank INTEGER,
        datebegin INTEGER,
        dateend INTEGER,
        FOREIGN KEY(objectid) REFERENCES artifact_metadata(id)
    );

    CREATE TABLE IF NOT EXISTS artifact_colors (
        objectid INTEGER NOT NULL,
        color TEXT NOT NULL,
        spectrum TEXT NOT NULL,
        hue TEXT NOT NULL,
        percent REAL NOT NULL,
        css3 TEXT NOT NULL,
        FOREIGN KEY(objectid) REFERENCES artifact_metadata(id)
    );

    CREATE INDEX IF NOT EXISTS idx_artifact_colors_objectid ON artifact_colors(objectid);
";

/// Drops every table `SCHEMA` creates. Children first.
pub const DROP_ALL: &str = "
    DROP INDEX IF EXISTS idx_artifact_colors_objectid;
    DROP TABLE IF EXISTS artifact_colors;
    DROP TABLE IF EXISTS artifact_media;
    DROP TABLE IF EXISTS artifact_metadata;
";

pub const TABLES: [&str; 3] = ["artifact_metadata", "artifact_media", "artifact_colors"];
