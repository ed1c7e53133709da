pub mod graphql;
pub mod rest;
