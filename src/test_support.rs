use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use crate::{
    db,
    entities::{actor, director, genre},
    reference::{self, NewActor, NewDirector, NewGenre},
};

/// A freshly migrated SQLite file inside its own temporary directory.
pub async fn test_db() -> (TempDir, DatabaseConnection) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("catalog.db").display());
    let db = db::connect_and_migrate(&url).await.unwrap();
    (dir, db)
}

pub async fn seed_director(db: &DatabaseConnection, name: &str) -> director::Model {
    reference::create_director(
        db,
        NewDirector { name: name.to_string(), nationality: None, birth_date: None },
    )
    .await
    .unwrap()
}

pub async fn seed_genre(db: &DatabaseConnection, name: &str) -> genre::Model {
    reference::create_genre(db, NewGenre { name: name.to_string(), description: None })
        .await
        .unwrap()
}

pub async fn seed_actor(db: &DatabaseConnection, name: &str) -> actor::Model {
    reference::create_actor(
        db,
        NewActor { name: name.to_string(), biography: None, birth_date: None },
    )
    .await
    .unwrap()
}
