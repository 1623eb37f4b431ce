// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The remote data source capability and the session gating it

use std::fmt;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::payload::{AppList, KeySetList, UsageSeries};
use crate::scope::{FetchParams, Scope};

/// Remote calls the orchestrator issues on a cache miss
///
/// Implementations own timeouts and transport concerns. Each call is keyed by
/// scope and date range and authorized by the session token.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_account_usage(
        &self,
        token: &str,
        scope: &Scope,
        params: &FetchParams,
    ) -> Result<UsageSeries, RemoteError>;

    async fn fetch_apps(
        &self,
        token: &str,
        scope: &Scope,
        params: &FetchParams,
    ) -> Result<AppList, RemoteError>;

    async fn fetch_keys(
        &self,
        token: &str,
        scope: &Scope,
        params: &FetchParams,
    ) -> Result<KeySetList, RemoteError>;
}

/// Authentication state deciding whether fetching is permitted
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn with_token<S: Into<String>>(token: S) -> Self {
        let token = token.into();
        Self {
            token: if token.is_empty() { None } else { Some(token) },
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_is_anonymous() {
        assert!(!Session::with_token("").is_authenticated());
        assert!(Session::with_token("abc").is_authenticated());
        assert_eq!(Session::anonymous().token(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", Session::with_token("secret-token"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("redacted"));
    }
}
