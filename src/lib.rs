pub mod admin;
pub mod api_router;
pub mod auth;
pub mod campaigns;
pub mod config;
pub mod documents;
pub mod leads;
pub mod people;
pub mod portal;
pub mod properties;
pub mod shared;
