use serde::Serialize;

/// Posts per feed page.
pub const PAGE_SIZE: u64 = 10;

/// Page number as requested by the client, before clamping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageNumber(Option<i64>);

impl PageNumber {
    pub fn first() -> Self {
        Self(None)
    }

    pub fn new(number: i64) -> Self {
        Self(Some(number))
    }

    /// Missing or non-numeric input means the first page.
    pub fn parse(raw: Option<&str>) -> Self {
        Self(raw.and_then(|s| s.trim().parse::<i64>().ok()))
    }
}

/// Splits `total` items into pages of `per_page`.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: u64,
    total: u64,
}

impl Paginator {
    pub fn new(total: u64, per_page: u64) -> Self {
        Self {
            per_page: per_page.max(1),
            total,
        }
    }

    /// Always at least one page, even when there is nothing to show.
    pub fn num_pages(&self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    /// First page when unspecified, last page when out of range on either side.
    pub fn resolve(&self, requested: PageNumber) -> u64 {
        match requested.0 {
            None => 1,
            Some(n) if n < 1 => self.num_pages(),
            Some(n) => (n as u64).min(self.num_pages()),
        }
    }

    pub fn offset(&self, number: u64) -> u64 {
        (number.saturating_sub(1)) * self.per_page
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }

    pub fn page<T>(&self, number: u64, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number,
            num_pages: self.num_pages(),
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
