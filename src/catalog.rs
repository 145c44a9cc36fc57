use std::collections::BTreeSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    LoaderTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
    sea_query::{Expr, Func, LikeExpr},
};
use tracing::{debug, info, warn};
use validator::{Validate, ValidationErrors};

use crate::{
    entities::{actor, director, genre, movie, movie_actor},
    error::{CatalogError, CatalogResult},
    models::{
        FormOptions, MovieDetail, MovieFields, MovieFilter, MovieForm, MovieFormPage,
        MovieListPage, MovieSummary, SelectOption, field_error,
    },
    reference,
    uploads::{PosterStore, PosterUpload},
};

const LIKE_ESCAPE: char = '!';

/// Movies matching every supplied filter, each with its genre and director.
///
/// The title term is trimmed and matched as a literal substring. Case folding covers
/// ASCII letters only, the same folding SQLite's `LOWER` applies to the column.
pub async fn list(
    db: &DatabaseConnection,
    filter: &MovieFilter,
) -> CatalogResult<Vec<MovieSummary>> {
    let mut query = movie::Entity::find();

    if let Some(genre_id) = filter.genre_id {
        query = query.filter(movie::Column::GenreId.eq(genre_id));
    }
    if let Some(director_id) = filter.director_id {
        query = query.filter(movie::Column::DirectorId.eq(director_id));
    }
    if let Some(term) = filter.title_term() {
        let pattern = format!("%{}%", escape_like(&term.to_ascii_lowercase()));
        query = query.filter(
            Expr::expr(Func::lower(Expr::col((movie::Entity, movie::Column::Title))))
                .like(LikeExpr::new(pattern).escape(LIKE_ESCAPE)),
        );
    }

    let movies = query.order_by_asc(movie::Column::Id).all(db).await?;
    let genres = movies.load_one(genre::Entity, db).await?;
    let directors = movies.load_one(director::Entity, db).await?;

    debug!(
        genre_id = ?filter.genre_id,
        director_id = ?filter.director_id,
        title = ?filter.title_term(),
        count = movies.len(),
        "listed movies"
    );

    Ok(movies
        .into_iter()
        .zip(genres)
        .zip(directors)
        .map(|((movie, genre), director)| MovieSummary { movie, genre, director })
        .collect())
}

/// The listing plus everything needed to render its filter controls.
pub async fn list_page(
    db: &DatabaseConnection,
    filter: &MovieFilter,
) -> CatalogResult<MovieListPage> {
    let movies = list(db, filter).await?;
    let genres = reference::list_genres(db).await?;
    let directors = reference::list_directors(db).await?;

    Ok(MovieListPage {
        movies,
        genres: genre_options(genres, filter.genre_id),
        directors: director_options(directors, filter.director_id),
        title_filter: filter.title.clone(),
    })
}

pub async fn detail(db: &DatabaseConnection, id: i32) -> CatalogResult<MovieDetail> {
    let movie = find(db, id).await?;
    let genre = movie.find_related(genre::Entity).one(db).await?;
    let director = movie.find_related(director::Entity).one(db).await?;
    let cast = movie
        .find_related(actor::Entity)
        .order_by_asc(actor::Column::Name)
        .order_by_asc(actor::Column::Id)
        .all(db)
        .await?;

    Ok(MovieDetail { movie, genre, director, cast })
}

/// The movie with genre and director, shown before a delete is confirmed.
pub async fn delete_preview(db: &DatabaseConnection, id: i32) -> CatalogResult<MovieSummary> {
    let movie = find(db, id).await?;
    let genre = movie.find_related(genre::Entity).one(db).await?;
    let director = movie.find_related(director::Entity).one(db).await?;

    Ok(MovieSummary { movie, genre, director })
}

/// Create a movie, store its poster if one was sent, and link the selected actors.
///
/// Duplicate actor ids collapse into a single link.
pub async fn create(
    db: &DatabaseConnection,
    posters: &PosterStore,
    fields: MovieFields,
    poster: Option<&PosterUpload>,
    actor_ids: &[i32],
) -> CatalogResult<movie::Model> {
    let selected: BTreeSet<i32> = actor_ids.iter().copied().collect();
    validate(db, &fields, &selected).await?;

    let image = store_poster(posters, poster, fields.image.clone()).await?;

    let txn = db.begin().await?;

    let created = movie::ActiveModel {
        id: Default::default(),
        title: Set(fields.title),
        synopsis: Set(fields.synopsis),
        duration: Set(fields.duration),
        release_date: Set(fields.release_date.to_string()),
        image: Set(image),
        genre_id: Set(fields.genre_id),
        director_id: Set(fields.director_id),
        version: Set(1),
    }
    .insert(&txn)
    .await?;

    link_actors(&txn, created.id, &selected).await?;
    txn.commit().await?;

    info!(movie_id = created.id, title = %created.title, cast = selected.len(), "created movie");
    Ok(created)
}

/// Overwrite a movie's fields and make its cast exactly `actor_ids`.
///
/// Without a new poster the image becomes whatever was submitted, so clearing the
/// field clears the stored image.
pub async fn update(
    db: &DatabaseConnection,
    posters: &PosterStore,
    id: i32,
    fields: MovieFields,
    poster: Option<&PosterUpload>,
    actor_ids: &[i32],
) -> CatalogResult<()> {
    let existing = find(db, id).await?;

    let selected: BTreeSet<i32> = actor_ids.iter().copied().collect();
    validate(db, &fields, &selected).await?;

    let image = store_poster(posters, poster, fields.image.clone()).await?;

    persist_update(db, id, existing.version, &fields, image, &selected).await
}

/// Remove a movie and, through the foreign key, its cast links. Missing ids are ignored.
pub async fn delete(db: &DatabaseConnection, id: i32) -> CatalogResult<()> {
    let result = movie::Entity::delete_by_id(id).exec(db).await?;

    if result.rows_affected == 0 {
        debug!(movie_id = id, "movie already gone");
    } else {
        info!(movie_id = id, "deleted movie");
    }
    Ok(())
}

pub async fn form_options(
    db: &DatabaseConnection,
    genre_id: Option<i32>,
    director_id: Option<i32>,
    actor_ids: &[i32],
) -> CatalogResult<FormOptions> {
    let genres = reference::list_genres(db).await?;
    let directors = reference::list_directors(db).await?;
    let actors = reference::list_actors(db).await?;

    Ok(FormOptions {
        genres: genre_options(genres, genre_id),
        directors: director_options(directors, director_id),
        actors: actors
            .into_iter()
            .map(|a| SelectOption { selected: actor_ids.contains(&a.id), id: a.id, name: a.name })
            .collect(),
    })
}

fn genre_options(genres: Vec<genre::Model>, selected: Option<i32>) -> Vec<SelectOption> {
    genres
        .into_iter()
        .map(|g| SelectOption { selected: Some(g.id) == selected, id: g.id, name: g.name })
        .collect()
}

fn director_options(directors: Vec<director::Model>, selected: Option<i32>) -> Vec<SelectOption> {
    directors
        .into_iter()
        .map(|d| SelectOption { selected: Some(d.id) == selected, id: d.id, name: d.name })
        .collect()
}

/// The stored movie as an editable form with its current selections.
pub async fn edit_form(db: &DatabaseConnection, id: i32) -> CatalogResult<MovieFormPage> {
    let movie = find(db, id).await?;
    let actor_ids: Vec<i32> = cast_ids(db, id).await?.into_iter().collect();
    let options =
        form_options(db, Some(movie.genre_id), Some(movie.director_id), &actor_ids).await?;

    Ok(MovieFormPage {
        movie: MovieForm::from_model(&movie, &actor_ids),
        errors: ValidationErrors::new(),
        options,
    })
}

/// Echo a rejected submission with its errors and the selection controls.
pub async fn rejected_form(
    db: &DatabaseConnection,
    form: MovieForm,
    errors: ValidationErrors,
) -> CatalogResult<MovieFormPage> {
    let genre_id = form.genre_id.trim().parse().ok();
    let director_id = form.director_id.trim().parse().ok();
    let actor_ids: Vec<i32> =
        form.selected_actors.iter().filter_map(|s| s.trim().parse().ok()).collect();
    let options = form_options(db, genre_id, director_id, &actor_ids).await?;

    Ok(MovieFormPage { movie: form, errors, options })
}

/// Difference between a movie's stored cast and a newly submitted one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CastDiff {
    pub added: BTreeSet<i32>,
    pub removed: BTreeSet<i32>,
}

impl CastDiff {
    pub fn between(current: &BTreeSet<i32>, selected: &BTreeSet<i32>) -> Self {
        Self {
            added: selected.difference(current).copied().collect(),
            removed: current.difference(selected).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

async fn find(db: &DatabaseConnection, id: i32) -> CatalogResult<movie::Model> {
    movie::Entity::find_by_id(id).one(db).await?.ok_or(CatalogError::NotFound(id))
}

async fn exists(db: &DatabaseConnection, id: i32) -> CatalogResult<bool> {
    Ok(movie::Entity::find_by_id(id).count(db).await? > 0)
}

async fn cast_ids<C: ConnectionTrait>(conn: &C, movie_id: i32) -> Result<BTreeSet<i32>, DbErr> {
    let ids = movie_actor::Entity::find()
        .select_only()
        .column(movie_actor::Column::ActorId)
        .filter(movie_actor::Column::MovieId.eq(movie_id))
        .into_tuple::<i32>()
        .all(conn)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Field constraints plus existence of every referenced genre, director and actor.
async fn validate(
    db: &DatabaseConnection,
    fields: &MovieFields,
    actor_ids: &BTreeSet<i32>,
) -> CatalogResult<()> {
    let mut errors = fields.validate().err().unwrap_or_default();

    if genre::Entity::find_by_id(fields.genre_id).count(db).await? == 0 {
        errors.add(
            "genre_id",
            field_error("unknown", format!("genre {} does not exist", fields.genre_id)),
        );
    }
    if director::Entity::find_by_id(fields.director_id).count(db).await? == 0 {
        errors.add(
            "director_id",
            field_error("unknown", format!("director {} does not exist", fields.director_id)),
        );
    }

    if !actor_ids.is_empty() {
        let known: BTreeSet<i32> = actor::Entity::find()
            .select_only()
            .column(actor::Column::Id)
            .filter(actor::Column::Id.is_in(actor_ids.iter().copied()))
            .into_tuple::<i32>()
            .all(db)
            .await?
            .into_iter()
            .collect();
        for missing in actor_ids.difference(&known) {
            errors.add(
                "selected_actors",
                field_error("unknown", format!("actor {missing} does not exist")),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        debug!(errors = %errors, "movie rejected");
        Err(CatalogError::Validation(errors))
    }
}

/// A non-empty upload replaces the image; otherwise the submitted value stands.
async fn store_poster(
    posters: &PosterStore,
    poster: Option<&PosterUpload>,
    submitted: Option<String>,
) -> CatalogResult<Option<String>> {
    match poster.filter(|p| !p.is_empty()) {
        Some(upload) => Ok(Some(posters.store(upload).await?)),
        None => Ok(submitted),
    }
}

/// Write the new field values if the row still carries `expected_version`, then
/// reconcile the cast, all in one transaction.
async fn persist_update(
    db: &DatabaseConnection,
    id: i32,
    expected_version: i32,
    fields: &MovieFields,
    image: Option<String>,
    selected: &BTreeSet<i32>,
) -> CatalogResult<()> {
    let txn = db.begin().await?;

    let result = movie::Entity::update_many()
        .col_expr(movie::Column::Title, Expr::value(fields.title.clone()))
        .col_expr(movie::Column::Synopsis, Expr::value(fields.synopsis.clone()))
        .col_expr(movie::Column::Duration, Expr::value(fields.duration))
        .col_expr(movie::Column::ReleaseDate, Expr::value(fields.release_date.to_string()))
        .col_expr(movie::Column::Image, Expr::value(image))
        .col_expr(movie::Column::GenreId, Expr::value(fields.genre_id))
        .col_expr(movie::Column::DirectorId, Expr::value(fields.director_id))
        .col_expr(movie::Column::Version, Expr::col(movie::Column::Version).add(1))
        .filter(movie::Column::Id.eq(id))
        .filter(movie::Column::Version.eq(expected_version))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        if exists(db, id).await? {
            warn!(movie_id = id, expected_version, "concurrent update detected");
            return Err(CatalogError::ConcurrencyConflict(id));
        }
        return Err(CatalogError::NotFound(id));
    }

    let current = cast_ids(&txn, id).await?;
    let diff = CastDiff::between(&current, selected);

    if !diff.is_empty() {
        link_actors(&txn, id, &diff.added).await?;
        if !diff.removed.is_empty() {
            movie_actor::Entity::delete_many()
                .filter(movie_actor::Column::MovieId.eq(id))
                .filter(movie_actor::Column::ActorId.is_in(diff.removed.iter().copied()))
                .exec(&txn)
                .await?;
        }
    }

    txn.commit().await?;

    info!(
        movie_id = id,
        added = diff.added.len(),
        removed = diff.removed.len(),
        "updated movie"
    );
    Ok(())
}

async fn link_actors<C: ConnectionTrait>(
    conn: &C,
    movie_id: i32,
    actor_ids: &BTreeSet<i32>,
) -> Result<(), DbErr> {
    if actor_ids.is_empty() {
        return Ok(());
    }

    movie_actor::Entity::insert_many(actor_ids.iter().map(|&actor_id| movie_actor::ActiveModel {
        movie_id: Set(movie_id),
        actor_id: Set(actor_id),
    }))
    .exec_without_returning(conn)
    .await?;

    Ok(())
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
