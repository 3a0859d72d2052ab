pub mod auth;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod geo;
pub mod normalization;
pub mod pet;
pub mod place;
pub mod rating;
pub mod record;
pub mod review;
pub mod routes;
pub mod urls;
pub mod user;
pub mod wizard;
