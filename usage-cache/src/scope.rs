// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Scope algebra for the account → app → keyset hierarchy
//!
//! Pure predicates over scopes and calendar-date ranges. Every derivation and
//! redundancy decision made by the cache goes through [`is_superset`],
//! [`date_contains`] and [`date_overlaps`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ScopeError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Level of a node in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Account,
    App,
    Keyset,
}

impl ScopeLevel {
    /// Breadth ordinal, larger is broader
    pub fn ordinal(self) -> u8 {
        match self {
            ScopeLevel::Account => 3,
            ScopeLevel::App => 2,
            ScopeLevel::Keyset => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeLevel::Account => "account",
            ScopeLevel::App => "app",
            ScopeLevel::Keyset => "keyset",
        }
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hierarchy node a request targets
///
/// Only constructible through [`Scope::account`], [`Scope::app`],
/// [`Scope::keyset`] or validated deserialization, so an App scope always has
/// an app id and a Keyset scope always has both an app id and a key id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ScopeSpec", into = "ScopeSpec")]
pub struct Scope {
    level: ScopeLevel,
    account_id: String,
    app_id: Option<String>,
    key_id: Option<String>,
}

impl Scope {
    pub fn account<A: Into<String>>(account_id: A) -> Self {
        Self {
            level: ScopeLevel::Account,
            account_id: account_id.into(),
            app_id: None,
            key_id: None,
        }
    }

    pub fn app<A: Into<String>, P: Into<String>>(account_id: A, app_id: P) -> Self {
        Self {
            level: ScopeLevel::App,
            account_id: account_id.into(),
            app_id: Some(app_id.into()),
            key_id: None,
        }
    }

    /// Keyset scope; `app_id` is the application owning the keyset
    pub fn keyset<A, P, K>(account_id: A, app_id: P, key_id: K) -> Self
    where
        A: Into<String>,
        P: Into<String>,
        K: Into<String>,
    {
        Self {
            level: ScopeLevel::Keyset,
            account_id: account_id.into(),
            app_id: Some(app_id.into()),
            key_id: Some(key_id.into()),
        }
    }

    pub fn level(&self) -> ScopeLevel {
        self.level
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Whether this scope strictly contains `other`
    pub fn contains(&self, other: &Scope) -> bool {
        is_superset(self, other)
    }

    /// The immediate broader scope, `None` for an account
    pub fn parent(&self) -> Option<Scope> {
        match self.level {
            ScopeLevel::Account => None,
            ScopeLevel::App => Some(Scope::account(self.account_id.clone())),
            ScopeLevel::Keyset => self
                .app_id
                .as_ref()
                .map(|app| Scope::app(self.account_id.clone(), app.clone())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.account_id)?;
        if let Some(app) = &self.app_id {
            write!(f, "/{}", app)?;
        }
        if let Some(key) = &self.key_id {
            write!(f, "/{}", key)?;
        }
        Ok(())
    }
}

/// Wire form of a scope, validated into [`Scope`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopeSpec {
    level: ScopeLevel,
    account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_id: Option<String>,
}

impl TryFrom<ScopeSpec> for Scope {
    type Error = ScopeError;

    fn try_from(spec: ScopeSpec) -> Result<Self, Self::Error> {
        if spec.account_id.is_empty() {
            return Err(ScopeError::EmptyAccountId);
        }

        let unexpected = |field: &str| ScopeError::UnexpectedId {
            level: spec.level.to_string(),
            field: field.to_string(),
        };

        match spec.level {
            ScopeLevel::Account => {
                if spec.app_id.is_some() {
                    return Err(unexpected("app id"));
                }
                if spec.key_id.is_some() {
                    return Err(unexpected("key id"));
                }
                Ok(Scope::account(spec.account_id))
            }
            ScopeLevel::App => {
                if spec.key_id.is_some() {
                    return Err(unexpected("key id"));
                }
                let app_id = spec.app_id.clone().ok_or(ScopeError::MissingAppId {
                    level: spec.level.to_string(),
                })?;
                Ok(Scope::app(spec.account_id, app_id))
            }
            ScopeLevel::Keyset => {
                let app_id = spec.app_id.clone().ok_or(ScopeError::MissingAppId {
                    level: spec.level.to_string(),
                })?;
                let key_id = spec.key_id.clone().ok_or(ScopeError::MissingKeyId)?;
                Ok(Scope::keyset(spec.account_id, app_id, key_id))
            }
        }
    }
}

impl From<Scope> for ScopeSpec {
    fn from(scope: Scope) -> Self {
        Self {
            level: scope.level,
            account_id: scope.account_id,
            app_id: scope.app_id,
            key_id: scope.key_id,
        }
    }
}

/// Date window and auxiliary filters of a request
///
/// `start_date <= end_date` always holds. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ParamsSpec", into = "ParamsSpec")]
pub struct FetchParams {
    start_date: NaiveDate,
    end_date: NaiveDate,
    filters: BTreeMap<String, String>,
}

impl FetchParams {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ScopeError> {
        if start_date > end_date {
            return Err(ScopeError::InvalidDateRange {
                start: start_date.format(DATE_FORMAT).to_string(),
                end: end_date.format(DATE_FORMAT).to_string(),
            });
        }

        Ok(Self {
            start_date,
            end_date,
            filters: BTreeMap::new(),
        })
    }

    /// Build from ISO `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, ScopeError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn with_filter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    /// Whether this window fully contains `other`
    pub fn contains(&self, other: &FetchParams) -> bool {
        date_contains(
            self.start_date,
            self.end_date,
            other.start_date,
            other.end_date,
        )
    }

    pub fn overlaps(&self, other: &FetchParams) -> bool {
        date_overlaps(
            self.start_date,
            self.end_date,
            other.start_date,
            other.end_date,
        )
    }

    /// Number of calendar days covered, inclusive
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Whether two requests were made under the same auxiliary filters
    pub fn same_filters(&self, other: &FetchParams) -> bool {
        self.filters == other.filters
    }

    pub(crate) fn range_label(&self) -> String {
        format!(
            "{}..{}",
            self.start_date.format(DATE_FORMAT),
            self.end_date.format(DATE_FORMAT)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParamsSpec {
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    filters: BTreeMap<String, String>,
}

impl TryFrom<ParamsSpec> for FetchParams {
    type Error = ScopeError;

    fn try_from(spec: ParamsSpec) -> Result<Self, Self::Error> {
        let mut params = FetchParams::new(spec.start_date, spec.end_date)?;
        params.filters = spec.filters;
        Ok(params)
    }
}

impl From<FetchParams> for ParamsSpec {
    fn from(params: FetchParams) -> Self {
        Self {
            start_date: params.start_date,
            end_date: params.end_date,
            filters: params.filters,
        }
    }
}

/// Parse an ISO `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Result<NaiveDate, ScopeError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| ScopeError::InvalidDate(value.to_string()))
}

/// Whether scope `a` strictly contains scope `b`
///
/// Same account, strictly broader level, and for a Keyset `b` an App-level `a`
/// must own it. Irreflexive and transitive.
pub fn is_superset(a: &Scope, b: &Scope) -> bool {
    if a.account_id != b.account_id || a.level.ordinal() <= b.level.ordinal() {
        return false;
    }

    match b.level {
        ScopeLevel::Account => false,
        ScopeLevel::App => a.level == ScopeLevel::Account,
        ScopeLevel::Keyset => match a.level {
            ScopeLevel::Account => true,
            ScopeLevel::App => a.app_id.is_some() && a.app_id == b.app_id,
            ScopeLevel::Keyset => false,
        },
    }
}

/// Whether scope `a` is strictly contained by scope `b`
pub fn is_subset(a: &Scope, b: &Scope) -> bool {
    is_superset(b, a)
}

pub fn date_contains(
    container_start: NaiveDate,
    container_end: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) -> bool {
    container_start <= start && container_end >= end
}

pub fn date_overlaps(start1: NaiveDate, end1: NaiveDate, start2: NaiveDate, end2: NaiveDate) -> bool {
    start1 <= end2 && start2 <= end1
}
