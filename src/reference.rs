use jiff::civil::Date;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::{
    entities::{actor, director, genre},
    error::CatalogResult,
    models::{non_empty, not_blank},
};

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewDirector {
    #[validate(custom(function = "not_blank"), length(max = 150))]
    pub name: String,
    #[validate(length(max = 100))]
    pub nationality: Option<String>,
    pub birth_date: Option<Date>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewGenre {
    #[validate(custom(function = "not_blank"), length(max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewActor {
    #[validate(custom(function = "not_blank"), length(max = 150))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub biography: Option<String>,
    pub birth_date: Option<Date>,
}

pub async fn create_director(
    db: &DatabaseConnection,
    input: NewDirector,
) -> CatalogResult<director::Model> {
    input.validate()?;

    let created = director::ActiveModel {
        id: Default::default(),
        name: Set(input.name),
        nationality: Set(input.nationality.as_deref().and_then(non_empty)),
        birth_date: Set(input.birth_date.map(|d| d.to_string())),
    }
    .insert(db)
    .await?;

    info!(director_id = created.id, name = %created.name, "created director");
    Ok(created)
}

pub async fn list_directors(db: &DatabaseConnection) -> CatalogResult<Vec<director::Model>> {
    Ok(director::Entity::find()
        .order_by_asc(director::Column::Name)
        .order_by_asc(director::Column::Id)
        .all(db)
        .await?)
}

pub async fn create_genre(db: &DatabaseConnection, input: NewGenre) -> CatalogResult<genre::Model> {
    input.validate()?;

    let created = genre::ActiveModel {
        id: Default::default(),
        name: Set(input.name),
        description: Set(input.description.as_deref().and_then(non_empty)),
    }
    .insert(db)
    .await?;

    info!(genre_id = created.id, name = %created.name, "created genre");
    Ok(created)
}

pub async fn list_genres(db: &DatabaseConnection) -> CatalogResult<Vec<genre::Model>> {
    Ok(genre::Entity::find()
        .order_by_asc(genre::Column::Name)
        .order_by_asc(genre::Column::Id)
        .all(db)
        .await?)
}

pub async fn create_actor(db: &DatabaseConnection, input: NewActor) -> CatalogResult<actor::Model> {
    input.validate()?;

    let created = actor::ActiveModel {
        id: Default::default(),
        name: Set(input.name),
        biography: Set(input.biography.as_deref().and_then(non_empty)),
        birth_date: Set(input.birth_date.map(|d| d.to_string())),
    }
    .insert(db)
    .await?;

    info!(actor_id = created.id, name = %created.name, "created actor");
    Ok(created)
}

pub async fn list_actors(db: &DatabaseConnection) -> CatalogResult<Vec<actor::Model>> {
    Ok(actor::Entity::find()
        .order_by_asc(actor::Column::Name)
        .order_by_asc(actor::Column::Id)
        .all(db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::CatalogError, test_support::test_db};

    #[tokio::test]
    async fn directors_are_listed_by_name() {
        let (_dir, db) = test_db().await;

        for name in ["Mann", "Bigelow", "Kurosawa"] {
            create_director(
                &db,
                NewDirector { name: name.to_string(), nationality: None, birth_date: None },
            )
            .await
            .unwrap();
        }

        let names: Vec<_> =
            list_directors(&db).await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["Bigelow", "Kurosawa", "Mann"]);
    }

    #[tokio::test]
    async fn actor_birth_date_is_stored_as_iso_date() {
        let (_dir, db) = test_db().await;

        let actor = create_actor(
            &db,
            NewActor {
                name: "Al Pacino".to_string(),
                biography: Some(String::new()),
                birth_date: Some(jiff::civil::date(1940, 4, 25)),
            },
        )
        .await
        .unwrap();

        assert_eq!(actor.birth_date.as_deref(), Some("1940-04-25"));
        assert_eq!(actor.biography, None);
    }

    #[tokio::test]
    async fn blank_or_oversized_names_are_rejected() {
        let (_dir, db) = test_db().await;

        let err = create_genre(&db, NewGenre { name: "  ".to_string(), description: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let err = create_genre(&db, NewGenre { name: "g".repeat(101), description: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        assert!(list_genres(&db).await.unwrap().is_empty());
    }
}
