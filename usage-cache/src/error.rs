// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for scopes, cache configuration and remote fetches

use thiserror::Error;

/// Errors raised while building scopes or fetch parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Account id must not be empty")]
    EmptyAccountId,

    #[error("{level} scope requires an app id")]
    MissingAppId { level: String },

    #[error("Keyset scope requires a key id")]
    MissingKeyId,

    #[error("{level} scope must not carry a {field}")]
    UnexpectedId { level: String, field: String },
}

/// Errors raised by cache configuration validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid cache configuration: {0}")]
    Invalid(String),
}

/// Error reported by a remote data source
///
/// Carried through the orchestrator unmodified, so the message and status are
/// whatever the data source produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status<S: Into<String>>(status: u16, message: S) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// Errors surfaced by the fetch orchestrator
///
/// Cloneable so one in-flight result can be handed to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("No session token available")]
    NoSession,

    #[error("Remote fetch failed: {0}")]
    RemoteFetchFailed(#[from] RemoteError),

    #[error("Fetch task aborted: {0}")]
    TaskAborted(String),
}

impl FetchError {
    /// The data source error, if this failure came from the remote call
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            FetchError::RemoteFetchFailed(err) => Some(err),
            _ => None,
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
