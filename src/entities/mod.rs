pub mod actor;
pub mod director;
pub mod genre;
pub mod movie;
pub mod movie_actor;
