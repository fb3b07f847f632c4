//! Table definitions for the reference data and the ingestion targets.
//!
//! All statements are idempotent (`CREATE ... IF NOT EXISTS`).

use sqlx::SqlitePool;
use tracing::info;

use crate::error::StoreResult;

const TABLES: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            login TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "sites",
        r#"
        CREATE TABLE IF NOT EXISTS sites (
            id INTEGER PRIMARY KEY,
            sitename TEXT NOT NULL,
            city TEXT,
            state TEXT,
            country TEXT,
            time_zone TEXT
        )
        "#,
    ),
    (
        "species",
        r#"
        CREATE TABLE IF NOT EXISTS species (
            id INTEGER PRIMARY KEY,
            scientificname TEXT NOT NULL,
            genus TEXT,
            species TEXT,
            commonname TEXT
        )
        "#,
    ),
    (
        "cultivars",
        r#"
        CREATE TABLE IF NOT EXISTS cultivars (
            id INTEGER PRIMARY KEY,
            specie_id INTEGER REFERENCES species(id),
            name TEXT NOT NULL,
            ecotype TEXT
        )
        "#,
    ),
    (
        "citations",
        r#"
        CREATE TABLE IF NOT EXISTS citations (
            id INTEGER PRIMARY KEY,
            author TEXT NOT NULL,
            year INTEGER,
            title TEXT,
            doi TEXT
        )
        "#,
    ),
    (
        "treatments",
        r#"
        CREATE TABLE IF NOT EXISTS treatments (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            definition TEXT,
            control INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "citations_treatments",
        r#"
        CREATE TABLE IF NOT EXISTS citations_treatments (
            citation_id INTEGER NOT NULL REFERENCES citations(id),
            treatment_id INTEGER NOT NULL REFERENCES treatments(id),
            PRIMARY KEY (citation_id, treatment_id)
        )
        "#,
    ),
    (
        "variables",
        r#"
        CREATE TABLE IF NOT EXISTS variables (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            units TEXT,
            min REAL,
            max REAL
        )
        "#,
    ),
    (
        "methods",
        r#"
        CREATE TABLE IF NOT EXISTS methods (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT
        )
        "#,
    ),
    (
        "entities",
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY,
            name TEXT,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "traits",
        r#"
        CREATE TABLE IF NOT EXISTS traits (
            id INTEGER PRIMARY KEY,
            entity_id INTEGER REFERENCES entities(id),
            site_id INTEGER REFERENCES sites(id),
            specie_id INTEGER REFERENCES species(id),
            cultivar_id INTEGER REFERENCES cultivars(id),
            citation_id INTEGER REFERENCES citations(id),
            treatment_id INTEGER REFERENCES treatments(id),
            variable_id INTEGER NOT NULL REFERENCES variables(id),
            method_id INTEGER REFERENCES methods(id),
            mean REAL NOT NULL,
            statname TEXT,
            stat REAL,
            n INTEGER,
            notes TEXT NOT NULL DEFAULT '',
            date TEXT,
            dateloc INTEGER NOT NULL DEFAULT 9,
            timeloc INTEGER NOT NULL DEFAULT 9,
            access_level INTEGER NOT NULL CHECK (access_level BETWEEN 1 AND 4),
            user_id INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "covariates",
        r#"
        CREATE TABLE IF NOT EXISTS covariates (
            id INTEGER PRIMARY KEY,
            trait_id INTEGER NOT NULL REFERENCES traits(id) ON DELETE CASCADE,
            variable_id INTEGER NOT NULL REFERENCES variables(id),
            level REAL NOT NULL,
            UNIQUE (trait_id, variable_id)
        )
        "#,
    ),
];

/// Create every table that does not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        tracing::debug!(table = name, "Ensured table");
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name)")
        .execute(pool)
        .await?;

    info!(tables = TABLES.len(), "Schema ready");
    Ok(())
}

/// Names of the tables managed here, in creation order.
pub fn table_names() -> impl Iterator<Item = &'static str> {
    TABLES.iter().map(|(name, _)| *name)
}
