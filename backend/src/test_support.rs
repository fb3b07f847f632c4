//! Shared fixtures for the inline test modules.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::store::init_schema;

/// Ids of the seeded reference rows.
#[derive(Debug, Clone, Copy)]
pub struct Seed {
    pub site_urbana: i64,
    pub site_ames: i64,
    pub site_no_zone: i64,
    pub species_maize: i64,
    pub species_soy: i64,
    pub cultivar_b73: i64,
    pub citation_smith: i64,
    pub citation_jones: i64,
    pub treatment_smith_control: i64,
    pub treatment_jones_control: i64,
    pub treatment_irrigated: i64,
    pub variable_height: i64,
    pub variable_temp: i64,
    pub variable_leaf_n: i64,
    pub method_ruler: i64,
    pub entity_plot1: i64,
}

/// Single-connection in-memory store with the schema applied.
///
/// The connection must never be recycled, otherwise the database vanishes.
pub async fn memory_store() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

async fn insert(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query(sql)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

/// Reference data most tests resolve against.
pub async fn seed_reference_data(pool: &SqlitePool) -> Seed {
    insert(pool, "INSERT INTO users (id, login) VALUES (1, 'tester')").await;

    let site_urbana = insert(
        pool,
        "INSERT INTO sites (sitename, city, state, country, time_zone) \
         VALUES ('Urbana', 'Urbana', 'IL', 'US', '-05:00')",
    )
    .await;
    let site_ames = insert(
        pool,
        "INSERT INTO sites (sitename, city, state, country, time_zone) \
         VALUES ('Ames', 'Ames', 'IA', 'US', '-06:00')",
    )
    .await;
    let site_no_zone = insert(
        pool,
        "INSERT INTO sites (sitename, country, time_zone) VALUES ('Nowhere Zone', 'US', NULL)",
    )
    .await;

    let species_maize = insert(
        pool,
        "INSERT INTO species (scientificname, genus, species, commonname) \
         VALUES ('Zea mays', 'Zea', 'mays', 'maize')",
    )
    .await;
    let species_soy = insert(
        pool,
        "INSERT INTO species (scientificname, genus, species, commonname) \
         VALUES ('Glycine max', 'Glycine', 'max', 'soybean')",
    )
    .await;
    let cultivar_b73 = insert(
        pool,
        &format!("INSERT INTO cultivars (specie_id, name) VALUES ({species_maize}, 'B73')"),
    )
    .await;

    let citation_smith = insert(
        pool,
        "INSERT INTO citations (author, year, title) VALUES ('Smith', 2001, 'Maize height')",
    )
    .await;
    let citation_jones = insert(
        pool,
        "INSERT INTO citations (author, year, title) VALUES ('Jones', 2010, 'Soy canopy')",
    )
    .await;

    let treatment_smith_control = insert(
        pool,
        "INSERT INTO treatments (name, definition, control) VALUES ('control', 'no input', 1)",
    )
    .await;
    let treatment_jones_control = insert(
        pool,
        "INSERT INTO treatments (name, definition, control) VALUES ('control', 'ambient', 1)",
    )
    .await;
    let treatment_irrigated = insert(
        pool,
        "INSERT INTO treatments (name, definition, control) VALUES ('irrigated', 'drip', 0)",
    )
    .await;
    for (citation, treatment) in [
        (citation_smith, treatment_smith_control),
        (citation_jones, treatment_jones_control),
        (citation_smith, treatment_irrigated),
    ] {
        insert(
            pool,
            &format!(
                "INSERT INTO citations_treatments (citation_id, treatment_id) \
                 VALUES ({citation}, {treatment})"
            ),
        )
        .await;
    }

    let variable_height = insert(
        pool,
        "INSERT INTO variables (name, units, min, max) VALUES ('height', 'cm', 0, 500)",
    )
    .await;
    let variable_temp = insert(
        pool,
        "INSERT INTO variables (name, units, min, max) VALUES ('temp', 'C', -50, 60)",
    )
    .await;
    let variable_leaf_n = insert(
        pool,
        "INSERT INTO variables (name, units) VALUES ('leafN', 'percent')",
    )
    .await;

    let method_ruler = insert(
        pool,
        "INSERT INTO methods (name, description) VALUES ('ruler', 'manual measurement')",
    )
    .await;

    let entity_plot1 = insert(
        pool,
        "INSERT INTO entities (name, notes) VALUES ('plot 1', 'north')",
    )
    .await;
    insert(pool, "INSERT INTO entities (name, notes) VALUES ('plot dup', 'east')").await;
    insert(pool, "INSERT INTO entities (name, notes) VALUES ('plot dup', 'west')").await;

    Seed {
        site_urbana,
        site_ames,
        site_no_zone,
        species_maize,
        species_soy,
        cultivar_b73,
        citation_smith,
        citation_jones,
        treatment_smith_control,
        treatment_jones_control,
        treatment_irrigated,
        variable_height,
        variable_temp,
        variable_leaf_n,
        method_ruler,
        entity_plot1,
    }
}
