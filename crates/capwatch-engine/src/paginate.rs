//! Paginated collection
//!
//! Cursor-driven enumeration over a listing operation, with a page ceiling and
//! two-level parent to child counting.

use capwatch_clients::{ListingClient, ListingPage, RetryExecutor};
use capwatch_core::constants::{DEFAULT_MAX_PAGES, NEXT_TOKEN_PARAM};
use capwatch_core::{ErrorKind, NestedListingSpec, RemoteError, ResourceContext};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Result of a nested count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NestedCount {
    /// Sum of child items over every counted parent.
    pub total: usize,
    /// Parents whose children were counted.
    pub parents: usize,
    /// Parents skipped because they lacked the join key.
    pub skipped: usize,
}

/// Walks listing operations page by page through the [`RetryExecutor`]
#[derive(Clone)]
pub struct PaginatedCollector {
    executor: RetryExecutor,
    max_pages: usize,
}

impl PaginatedCollector {
    pub fn new(executor: RetryExecutor, max_pages: usize) -> Self {
        Self {
            executor,
            max_pages: if max_pages == 0 {
                DEFAULT_MAX_PAGES
            } else {
                max_pages
            },
        }
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    async fn client(
        &self,
        service: &str,
        operation: &str,
    ) -> Result<Arc<dyn ListingClient>, RemoteError> {
        self.executor
            .registry()
            .listing(service)
            .await
            .ok_or_else(|| {
                RemoteError::new(
                    ErrorKind::Validation,
                    service,
                    operation,
                    "no listing client registered for service",
                )
            })
    }

    /// Fetch exactly one page, ignoring any continuation cursor.
    pub async fn fetch_page(
        &self,
        service: &str,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<ListingPage, RemoteError> {
        let client = self.client(service, operation).await?;
        let client = &client;
        self.executor
            .call(service, operation, move || client.invoke(operation, params))
            .await
    }

    /// Visit every page until the cursor runs out or the page ceiling is hit.
    async fn walk<F>(
        &self,
        service: &str,
        operation: &str,
        params: &Map<String, Value>,
        mut visit: F,
    ) -> Result<(), RemoteError>
    where
        F: FnMut(&ListingPage),
    {
        let client = self.client(service, operation).await?;
        let client = &client;
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        for page_number in 1..=self.max_pages {
            let mut request = params.clone();
            if let Some(token) = &cursor {
                request.insert(NEXT_TOKEN_PARAM.to_string(), Value::String(token.clone()));
            }
            let request = &request;

            let page = self
                .executor
                .call(service, operation, move || client.invoke(operation, request))
                .await?;
            visit(&page);

            match page.next_token {
                Some(token) if !token.is_empty() => {
                    if !seen_cursors.insert(token.clone()) {
                        tracing::warn!(
                            service = %service,
                            operation = %operation,
                            page = page_number,
                            "Listing returned a repeated cursor, stopping"
                        );
                        return Ok(());
                    }
                    cursor = Some(token);
                }
                _ => return Ok(()),
            }
        }

        tracing::warn!(
            service = %service,
            operation = %operation,
            max_pages = self.max_pages,
            "Page ceiling reached, returning partial results"
        );
        Ok(())
    }

    /// Every item under `result_key` across all pages.
    pub async fn collect_all(
        &self,
        service: &str,
        operation: &str,
        result_key: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut items = Vec::new();
        self.walk(service, operation, params, |page| {
            items.extend(page.items(result_key).iter().cloned());
        })
        .await?;
        tracing::debug!(
            service = %service,
            operation = %operation,
            count = items.len(),
            "Collected listing"
        );
        Ok(items)
    }

    /// Number of items under `result_key` across all pages.
    pub async fn count(
        &self,
        service: &str,
        operation: &str,
        result_key: &str,
        params: &Map<String, Value>,
    ) -> Result<usize, RemoteError> {
        let mut total = 0usize;
        self.walk(service, operation, params, |page| {
            total += page.items(result_key).len();
        })
        .await?;
        Ok(total)
    }

    /// Enumerate the parents, then count children once per parent join value.
    ///
    /// Parents without the join key are skipped with a warning. A failing child
    /// listing fails the whole count.
    pub async fn count_nested(
        &self,
        spec: &NestedListingSpec,
        context: Option<&ResourceContext>,
    ) -> Result<NestedCount, RemoteError> {
        let parents = self
            .collect_all(
                &spec.parent.service,
                &spec.parent.operation,
                &spec.parent.result_key,
                &spec.parent.params_for(context),
            )
            .await?;

        let mut outcome = NestedCount::default();
        for parent in &parents {
            let Some(join_value) = join_value(parent, &spec.join_key) else {
                tracing::warn!(
                    service = %spec.parent.service,
                    operation = %spec.parent.operation,
                    join_key = %spec.join_key,
                    "Parent item has no join key, skipping"
                );
                outcome.skipped += 1;
                continue;
            };

            let mut params = spec.child.params_for(context);
            params.insert(spec.child_param.clone(), Value::String(join_value));
            outcome.total += self
                .count(
                    &spec.child.service,
                    &spec.child.operation,
                    &spec.child.result_key,
                    &params,
                )
                .await?;
            outcome.parents += 1;
        }

        Ok(outcome)
    }
}

fn join_value(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_values_accept_strings_and_numbers() {
        assert_eq!(join_value(&json!({"Id": "d-1"}), "Id").as_deref(), Some("d-1"));
        assert_eq!(join_value(&json!({"Id": 7}), "Id").as_deref(), Some("7"));
        assert_eq!(join_value(&json!({"Id": ""}), "Id"), None);
        assert_eq!(join_value(&json!({"Id": null}), "Id"), None);
        assert_eq!(join_value(&json!({"Other": "x"}), "Id"), None);
    }
}
