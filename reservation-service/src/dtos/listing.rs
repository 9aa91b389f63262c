use crate::services::store::{Page, PaymentQuery, ReservationQuery};
use crate::utils::dates::parse_calendar_date;
use crate::utils::non_blank;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// 1-based page number and clamped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    pub fn new(page: Option<u64>, page_size: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReservationListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub event_from: Option<String>,
    pub event_to: Option<String>,
}

impl ReservationListParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }

    pub fn to_query(&self) -> Result<ReservationQuery, AppError> {
        let pagination = self.pagination();
        Ok(ReservationQuery {
            search: non_blank(self.search.clone()),
            event_from: date_bound("event_from", &self.event_from)?,
            event_to: date_bound("event_to", &self.event_to)?,
            skip: pagination.skip(),
            limit: pagination.limit(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    pub reservation_id: Option<String>,
}

impl PaymentListParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }

    pub fn to_query(&self) -> PaymentQuery {
        let pagination = self.pagination();
        PaymentQuery {
            search: non_blank(self.search.clone()),
            reservation_id: non_blank(self.reservation_id.clone()),
            skip: pagination.skip(),
            limit: pagination.limit(),
        }
    }
}

fn date_bound(
    name: &str,
    raw: &Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, AppError> {
    match non_blank(raw.clone()) {
        None => Ok(None),
        Some(value) => parse_calendar_date(&value).map(Some).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("{} must be a date (YYYY-MM-DD)", name))
        }),
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl<T> ListResponse<T> {
    pub fn from_page<S>(page: Page<S>, pagination: Pagination) -> Self
    where
        S: Into<T>,
    {
        Self {
            items: page.items.into_iter().map(Into::into).collect(),
            total: page.total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: page.total.div_ceil(pagination.page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, page_size: 20 });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, page_size: 1 });
        assert_eq!(Pagination::new(Some(3), Some(500)).page_size, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(Some(3), Some(10)).skip(), 20);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page { items: vec![1u8, 2, 3], total: 21 };
        let response: ListResponse<u8> = ListResponse::from_page(page, Pagination::new(None, Some(10)));
        assert_eq!(response.total_pages, 3);
    }

    #[test]
    fn bad_date_bound_is_rejected() {
        let params = ReservationListParams {
            event_from: Some("next tuesday".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.to_query(), Err(AppError::BadRequest(_))));
    }
}
