pub use crate::model::*;

use miette::Diagnostic;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("client error: {0}")]
    ClientError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("no intersection found against offered checkpoints: {0:?}")]
    IntersectionNotFound(Vec<ChainPoint>),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl std::fmt::Display) -> Error {
        Error::ConfigError(text.to_string())
    }

    pub fn client(error: impl std::fmt::Display) -> Error {
        Error::ClientError(error.to_string())
    }

    pub fn parse(error: impl std::fmt::Display) -> Error {
        Error::ParseError(error.to_string())
    }

    pub fn server(error: impl std::fmt::Display) -> Error {
        Error::ServerError(error.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }
}
