use serde::Serialize;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Offset-based page request. Page numbers are 1-based; out-of-range values
/// are clamped rather than rejected so stale pager links stay harmless.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Pagination metadata returned alongside every list so clients can render a
/// pager without a second count request.
#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: Page) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + page.limit - 1) / page.limit
        };
        Self {
            total,
            page: page.page,
            limit: page.limit,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Upcoming,
    Past,
    All,
}

impl Timeframe {
    /// Parse the `upcomingPast` query value. Absent means `all`; anything
    /// unrecognised is an error the handler turns into a 400.
    pub fn parse(value: Option<&str>) -> Option<Timeframe> {
        match value {
            None => Some(Timeframe::All),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "upcoming" => Some(Timeframe::Upcoming),
                "past" => Some(Timeframe::Past),
                "all" | "" => Some(Timeframe::All),
                _ => None,
            },
        }
    }
}
