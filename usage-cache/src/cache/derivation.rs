// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Strategies for answering a narrow request from a broader cached entry

use super::CacheEntry;
use crate::scope::Scope;

/// Produces a narrower-scope payload from a cached superset entry
///
/// Returning `None` declines the derivation; the caller then fetches.
pub trait DerivationStrategy<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn derive(&self, request: &Scope, superset: &CacheEntry<T>) -> Option<T>;
}

/// Collection payloads whose items can be filtered down to a scope
pub trait ScopedList: Clone {
    /// Items belonging to `scope`
    fn narrow_to(&self, scope: &Scope) -> Self;

    fn item_count(&self) -> usize;
}

/// Serve list payloads from a broader list by filtering on app/key ids
///
/// Same level returns the payload unchanged. An empty filtered list declines,
/// since the id may simply be newer than the cached list.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFilter;

impl<T: ScopedList + Send + Sync> DerivationStrategy<T> for IdentityFilter {
    fn name(&self) -> &'static str {
        "identity_filter"
    }

    fn derive(&self, request: &Scope, superset: &CacheEntry<T>) -> Option<T> {
        if request.level() == superset.scope().level() {
            return Some(superset.payload().clone());
        }

        let narrowed = superset.payload().narrow_to(request);
        if narrowed.item_count() == 0 {
            None
        } else {
            Some(narrowed)
        }
    }
}

/// Never derive
///
/// Usage series are aggregated per requested scope upstream; an account total
/// can not be split into per-app or per-keyset totals on the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDerivation;

impl<T> DerivationStrategy<T> for NoDerivation {
    fn name(&self) -> &'static str {
        "no_derivation"
    }

    fn derive(&self, _request: &Scope, _superset: &CacheEntry<T>) -> Option<T> {
        None
    }
}
