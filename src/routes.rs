use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::debug;
use validator::ValidationErrors;

use crate::{
    AppState, catalog,
    entities::{actor, director, genre},
    error::{AppError, AppResult, CatalogError},
    models::{
        FormOptions, MovieDetail, MovieFilter, MovieForm, MovieFormPage, MovieListPage,
        MovieSummary,
    },
    reference::{self, NewActor, NewDirector, NewGenre},
    uploads::{PosterUpload, UPLOADS_ROUTE},
};

const MOVIES_INDEX: &str = "/movies";

pub fn router(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.posters.root());
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/new", get(new_movie))
        .route("/movies/{id}", get(movie_detail))
        .route("/movies/{id}/edit", get(edit_movie).post(update_movie))
        .route("/movies/{id}/delete", get(confirm_delete).post(delete_movie))
        .route("/directors", get(list_directors).post(create_director))
        .route("/genres", get(list_genres).post(create_genre))
        .route("/actors", get(list_actors).post(create_actor))
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(body_limit)
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Movie id from the path. Anything that is not an integer is an unknown movie.
pub struct MovieId(i32);

impl<S: Send + Sync> FromRequestParts<S> for MovieId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = Path::<String>::from_request_parts(parts, state)
            .await
            .map(|Path(raw)| raw)
            .unwrap_or_default();
        match raw.trim().parse() {
            Ok(id) => Ok(Self(id)),
            Err(_) => Err(CatalogError::MalformedId(raw).into()),
        }
    }
}

/// Query string of the movie index. Blank ids mean "no filter".
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    genre_id: Option<String>,
    director_id: Option<String>,
    title: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> MovieFilter {
        let id = |raw: Option<String>| raw.and_then(|s| s.trim().parse().ok());
        MovieFilter {
            genre_id: id(self.genre_id),
            director_id: id(self.director_id),
            title: self.title,
        }
    }
}

async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<MovieListPage>> {
    Ok(Json(catalog::list_page(&state.db, &q.into_filter()).await?))
}

async fn new_movie(State(state): State<Arc<AppState>>) -> AppResult<Json<FormOptions>> {
    Ok(Json(catalog::form_options(&state.db, None, None, &[]).await?))
}

async fn movie_detail(
    State(state): State<Arc<AppState>>,
    MovieId(id): MovieId,
) -> AppResult<Json<MovieDetail>> {
    Ok(Json(catalog::detail(&state.db, id).await?))
}

async fn create_movie(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Response> {
    let (form, poster) = read_movie_form(multipart).await?;

    let (fields, actor_ids) = match form.bind() {
        Ok(bound) => bound,
        Err(errors) => return rejected(&state, form, errors).await,
    };

    match catalog::create(&state.db, &state.posters, fields, poster.as_ref(), &actor_ids).await {
        Ok(_) => Ok(Redirect::to(MOVIES_INDEX).into_response()),
        Err(CatalogError::Validation(errors)) => rejected(&state, form, errors).await,
        Err(err) => Err(err.into()),
    }
}

async fn edit_movie(
    State(state): State<Arc<AppState>>,
    MovieId(id): MovieId,
) -> AppResult<Json<MovieFormPage>> {
    Ok(Json(catalog::edit_form(&state.db, id).await?))
}

async fn update_movie(
    State(state): State<Arc<AppState>>,
    MovieId(id): MovieId,
    multipart: Multipart,
) -> AppResult<Response> {
    let (form, poster) = read_movie_form(multipart).await?;

    // A submitted id must name the movie in the path.
    if let Some(raw) = form.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if raw.parse::<i32>().ok() != Some(id) {
            return Err(CatalogError::NotFound(id).into());
        }
    }

    let (fields, actor_ids) = match form.bind() {
        Ok(bound) => bound,
        Err(errors) => return rejected(&state, form, errors).await,
    };

    match catalog::update(&state.db, &state.posters, id, fields, poster.as_ref(), &actor_ids).await
    {
        Ok(()) => Ok(Redirect::to(MOVIES_INDEX).into_response()),
        Err(CatalogError::Validation(errors)) => rejected(&state, form, errors).await,
        Err(err) => Err(err.into()),
    }
}

async fn confirm_delete(
    State(state): State<Arc<AppState>>,
    MovieId(id): MovieId,
) -> AppResult<Json<MovieSummary>> {
    Ok(Json(catalog::delete_preview(&state.db, id).await?))
}

async fn delete_movie(
    State(state): State<Arc<AppState>>,
    MovieId(id): MovieId,
) -> AppResult<Redirect> {
    catalog::delete(&state.db, id).await?;
    Ok(Redirect::to(MOVIES_INDEX))
}

async fn list_directors(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<director::Model>>> {
    Ok(Json(reference::list_directors(&state.db).await?))
}

async fn create_director(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewDirector>,
) -> AppResult<(StatusCode, Json<director::Model>)> {
    Ok((StatusCode::CREATED, Json(reference::create_director(&state.db, input).await?)))
}

async fn list_genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<genre::Model>>> {
    Ok(Json(reference::list_genres(&state.db).await?))
}

async fn create_genre(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewGenre>,
) -> AppResult<(StatusCode, Json<genre::Model>)> {
    Ok((StatusCode::CREATED, Json(reference::create_genre(&state.db, input).await?)))
}

async fn list_actors(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<actor::Model>>> {
    Ok(Json(reference::list_actors(&state.db).await?))
}

async fn create_actor(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewActor>,
) -> AppResult<(StatusCode, Json<actor::Model>)> {
    Ok((StatusCode::CREATED, Json(reference::create_actor(&state.db, input).await?)))
}

async fn rejected(
    state: &AppState,
    form: MovieForm,
    errors: ValidationErrors,
) -> AppResult<Response> {
    let page = catalog::rejected_form(&state.db, form, errors).await?;
    Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response())
}

async fn read_movie_form(
    mut multipart: Multipart,
) -> AppResult<(MovieForm, Option<PosterUpload>)> {
    let mut form = MovieForm::default();
    let mut poster = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "poster" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            poster = Some(PosterUpload { file_name, bytes: bytes.to_vec() });
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "id" => form.id = Some(value),
            "title" => form.title = value,
            "synopsis" => form.synopsis = value,
            "duration" => form.duration = value,
            "release_date" => form.release_date = value,
            "image" => form.image = value,
            "genre_id" => form.genre_id = value,
            "director_id" => form.director_id = value,
            "selected_actors" | "selected_actors[]" => form.selected_actors.push(value),
            other => debug!(field = %other, "ignoring unknown form field"),
        }
    }

    Ok((form, poster))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        test_support::{seed_director, seed_genre, test_db},
        uploads::PosterStore,
    };

    const BOUNDARY: &str = "catalog-test-boundary";

    async fn app() -> (TempDir, Router, i32, i32) {
        let (dir, db) = test_db().await;
        let genre = seed_genre(&db, "Drama").await;
        let director = seed_director(&db, "A").await;

        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            database_url: String::new(),
            uploads_dir: dir.path().join("uploads"),
            max_upload_bytes: 1024 * 1024,
        };
        let posters = PosterStore::new(config.uploads_dir.clone());
        let state = Arc::new(AppState { config: Arc::new(config), db, posters });

        (dir, router(state), genre.id, director.id)
    }

    fn multipart(
        uri: &str,
        fields: &[(&str, String)],
        poster: Option<(&str, &[u8])>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(format!("{value}\r\n").as_bytes());
        }
        if let Some((file_name, bytes)) = poster {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"poster\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn movie_fields(
        title: &str,
        duration: &str,
        genre_id: i32,
        director_id: i32,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("title", title.to_string()),
            ("duration", duration.to_string()),
            ("release_date", "2020-01-01".to_string()),
            ("genre_id", genre_id.to_string()),
            ("director_id", director_id.to_string()),
        ]
    }

    #[tokio::test]
    async fn create_redirects_and_serves_poster() {
        let (_dir, app, genre_id, director_id) = app().await;

        let resp = app
            .clone()
            .oneshot(multipart(
                "/movies",
                &movie_fields("T", "120", genre_id, director_id),
                Some(("cover.png", b"poster bytes")),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/movies");

        let page = json(app.clone().oneshot(get("/movies")).await.unwrap()).await;
        let movies = page["movies"].as_array().unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0]["genre"]["name"], "Drama");
        let image = movies[0]["image"].as_str().unwrap().to_string();
        assert!(image.starts_with("/uploads/movie_"));

        let resp = app.oneshot(get(&image)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"poster bytes");
    }

    #[tokio::test]
    async fn invalid_submission_echoes_input() {
        let (_dir, app, genre_id, director_id) = app().await;

        let resp = app
            .clone()
            .oneshot(multipart("/movies", &movie_fields("T", "abc", genre_id, director_id), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let page = json(resp).await;
        assert_eq!(page["movie"]["title"], "T");
        assert_eq!(page["movie"]["duration"], "abc");
        assert!(page["errors"]["duration"].is_array());
        assert_eq!(page["genres"][0]["selected"], true);

        let resp = app
            .clone()
            .oneshot(multipart("/movies", &movie_fields("T", "700", genre_id, director_id), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let page = json(app.oneshot(get("/movies")).await.unwrap()).await;
        assert!(page["movies"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_movie_is_404() {
        let (_dir, app, genre_id, director_id) = app().await;

        for uri in ["/movies/999", "/movies/999/edit", "/movies/999/delete"] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let resp = app
            .oneshot(multipart(
                "/movies/999/edit",
                &movie_fields("T", "120", genre_id, director_id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_movie_id_is_404() {
        let (_dir, app, genre_id, director_id) = app().await;

        for uri in ["/movies/abc", "/movies/abc/edit", "/movies/1.5/delete"] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
            assert!(json(resp).await["error"].as_str().unwrap().contains("not found"));
        }

        let resp = app
            .clone()
            .oneshot(multipart(
                "/movies/abc/edit",
                &movie_fields("T", "120", genre_id, director_id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = Request::builder()
            .method("POST")
            .uri("/movies/abc/delete")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn edit_with_mismatched_id_is_404() {
        let (_dir, app, genre_id, director_id) = app().await;
        app.clone()
            .oneshot(multipart("/movies", &movie_fields("T", "120", genre_id, director_id), None))
            .await
            .unwrap();

        let mut fields = movie_fields("Changed", "120", genre_id, director_id);
        fields.push(("id", "2".to_string()));
        let resp = app.clone().oneshot(multipart("/movies/1/edit", &fields, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let detail = json(app.oneshot(get("/movies/1")).await.unwrap()).await;
        assert_eq!(detail["title"], "T");
    }

    #[tokio::test]
    async fn delete_always_redirects() {
        let (_dir, app, genre_id, director_id) = app().await;
        app.clone()
            .oneshot(multipart("/movies", &movie_fields("T", "120", genre_id, director_id), None))
            .await
            .unwrap();

        for _ in 0..2 {
            let req = Request::builder()
                .method("POST")
                .uri("/movies/1/delete")
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        }

        let resp = app.oneshot(get("/movies/1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_filters_are_ignored() {
        let (_dir, app, genre_id, director_id) = app().await;
        app.clone()
            .oneshot(multipart(
                "/movies",
                &movie_fields("Heat", "170", genre_id, director_id),
                None,
            ))
            .await
            .unwrap();

        let resp = app.clone().oneshot(get("/movies?genre_id=&director_id=&title=")).await.unwrap();
        let page = json(resp).await;
        assert_eq!(page["movies"].as_array().unwrap().len(), 1);
        assert_eq!(page["title_filter"], "");

        let page = json(app.oneshot(get("/movies?title=HEA")).await.unwrap()).await;
        assert_eq!(page["movies"][0]["title"], "Heat");
    }

    #[tokio::test]
    async fn reference_data_is_validated() {
        let (_dir, app, _, _) = app().await;

        let req = |body: &str| {
            Request::builder()
                .method("POST")
                .uri("/genres")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let resp = app.clone().oneshot(req(r#"{"name":"  "}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp =
            app.clone().oneshot(req(r#"{"name":"Comedy","description":"Laughs"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let genres = json(app.oneshot(get("/genres")).await.unwrap()).await;
        let names: Vec<_> = genres.as_array().unwrap().iter().map(|g| g["name"].clone()).collect();
        assert_eq!(names, ["Comedy", "Drama"]);
    }
}
