use std::collections::HashMap;

use serde::Serialize;

use super::{filter::Predicate, repo::ObservationStore, repo_types::Observation};

pub const DEFAULT_PAGE: i64 = 1;
pub const MAX_PAGE: i64 = 10_000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

/// The page actually served once the total is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub items: Vec<T>,
}

fn int_param(params: &HashMap<String, String>, name: &str, default: i64, max: i64) -> i64 {
    params
        .get(name)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
        .clamp(1, max)
}

impl PageRequest {
    /// Unparsable values fall back to defaults; everything is clamped into range.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            page: int_param(params, "page", DEFAULT_PAGE, MAX_PAGE),
            page_size: int_param(params, "page_size", DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE),
        }
    }

    /// Snap an overshooting page back to the last one.
    pub fn resolve(self, total: i64) -> PageWindow {
        let last_page = if total <= 0 {
            1
        } else {
            (total + self.page_size - 1) / self.page_size
        };
        let page = self.page.min(last_page);
        PageWindow {
            page,
            page_size: self.page_size,
            offset: (page - 1) * self.page_size,
        }
    }
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            items: self.items.into_iter().map(f).collect(),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}

/// Count, order (newest `observed_at` first) and slice the records matching `pred`.
pub async fn paginate(
    store: &dyn ObservationStore,
    pred: &Predicate,
    req: PageRequest,
) -> anyhow::Result<Page<Observation>> {
    let total = store.count(pred).await?;
    let window = req.resolve(total);
    let items = if total == 0 {
        Vec::new()
    } else {
        store.fetch(pred, window.page_size, window.offset).await?
    };
    Ok(Page {
        page: window.page,
        page_size: window.page_size,
        total,
        items,
    })
}
