use std::{borrow::Cow, str::FromStr};

use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::{actor, director, genre, movie};

/// Typed movie fields after binding; what the catalog validates and writes.
#[derive(Clone, Debug, PartialEq, Validate)]
pub struct MovieFields {
    #[validate(custom(function = "not_blank"), length(max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub synopsis: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration: i32,
    pub release_date: Date,
    #[validate(length(max = 255))]
    pub image: Option<String>,
    pub genre_id: i32,
    pub director_id: i32,
}

/// Raw movie form values exactly as submitted, echoed back when a submission is rejected.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MovieForm {
    pub id: Option<String>,
    pub title: String,
    pub synopsis: String,
    pub duration: String,
    pub release_date: String,
    pub image: String,
    pub genre_id: String,
    pub director_id: String,
    pub selected_actors: Vec<String>,
}

impl MovieForm {
    pub fn from_model(movie: &movie::Model, actor_ids: &[i32]) -> Self {
        Self {
            id: Some(movie.id.to_string()),
            title: movie.title.clone(),
            synopsis: movie.synopsis.clone().unwrap_or_default(),
            duration: movie.duration.to_string(),
            release_date: movie.release_date.clone(),
            image: movie.image.clone().unwrap_or_default(),
            genre_id: movie.genre_id.to_string(),
            director_id: movie.director_id.to_string(),
            selected_actors: actor_ids.iter().map(i32::to_string).collect(),
        }
    }

    /// Parse the raw values into typed fields and selected actor ids.
    ///
    /// Every unparseable or missing value is reported; nothing short-circuits.
    pub fn bind(&self) -> Result<(MovieFields, Vec<i32>), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let duration = parse_required(&mut errors, "duration", &self.duration);
        let release_date = parse_required(&mut errors, "release_date", &self.release_date);
        let genre_id = parse_required(&mut errors, "genre_id", &self.genre_id);
        let director_id = parse_required(&mut errors, "director_id", &self.director_id);

        let mut actor_ids = Vec::with_capacity(self.selected_actors.len());
        for raw in self.selected_actors.iter().filter(|s| !s.trim().is_empty()) {
            match raw.trim().parse() {
                Ok(id) => actor_ids.push(id),
                Err(_) => errors.add(
                    "selected_actors",
                    field_error("invalid", format!("'{raw}' is not a valid actor id")),
                ),
            }
        }

        match (duration, release_date, genre_id, director_id) {
            (Some(duration), Some(release_date), Some(genre_id), Some(director_id))
                if errors.is_empty() =>
            {
                let fields = MovieFields {
                    title: self.title.clone(),
                    synopsis: non_empty(&self.synopsis),
                    duration,
                    release_date,
                    image: non_empty(&self.image),
                    genre_id,
                    director_id,
                };
                Ok((fields, actor_ids))
            },
            _ => Err(errors),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MovieFilter {
    pub genre_id: Option<i32>,
    pub director_id: Option<i32>,
    pub title: Option<String>,
}

impl MovieFilter {
    /// The trimmed title term, if it has any content.
    pub fn title_term(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MovieSummary {
    #[serde(flatten)]
    pub movie: movie::Model,
    pub genre: Option<genre::Model>,
    pub director: Option<director::Model>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub movie: movie::Model,
    pub genre: Option<genre::Model>,
    pub director: Option<director::Model>,
    pub cast: Vec<actor::Model>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub id: i32,
    pub name: String,
    pub selected: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct FormOptions {
    pub genres: Vec<SelectOption>,
    pub directors: Vec<SelectOption>,
    pub actors: Vec<SelectOption>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MovieListPage {
    pub movies: Vec<MovieSummary>,
    pub genres: Vec<SelectOption>,
    pub directors: Vec<SelectOption>,
    pub title_filter: Option<String>,
}

/// A movie form ready for (re-)display: values, field errors and the selection controls.
#[derive(Clone, Debug, Serialize)]
pub struct MovieFormPage {
    pub movie: MovieForm,
    pub errors: ValidationErrors,
    #[serde(flatten)]
    pub options: FormOptions,
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(field_error("required", "this field is required"));
    }
    Ok(())
}

pub(crate) fn field_error(
    code: &'static str,
    message: impl Into<Cow<'static, str>>,
) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// Empty form values mean "no value".
pub(crate) fn non_empty(raw: &str) -> Option<String> {
    if raw.trim().is_empty() { None } else { Some(raw.to_string()) }
}

fn parse_required<T: FromStr>(
    errors: &mut ValidationErrors,
    field: &'static str,
    raw: &str,
) -> Option<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.add(field, field_error("required", "this field is required"));
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(field, field_error("invalid", format!("'{raw}' is not a valid value")));
            None
        },
    }
}
