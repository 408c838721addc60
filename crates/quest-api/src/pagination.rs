use quest_types::api::Page;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `page` is 1-based. Out-of-range input is clamped rather than rejected;
/// the query schemas already reject it at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn wrap<T>(&self, data: Vec<T>, total: u64) -> Page<T> {
        Page {
            data,
            page: self.page,
            limit: self.limit,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_offsets() {
        let p = Pagination::new(None, None);
        assert_eq!((p.page, p.limit, p.offset()), (1, 20, 0));

        let p = Pagination::new(Some(3), Some(10));
        assert_eq!(p.offset(), 20);

        let p = Pagination::new(Some(0), Some(500));
        assert_eq!((p.page, p.limit), (1, 100));
    }
}
