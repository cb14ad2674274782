//! Page-number layout with ellipsis collapsing, the data contract a pager
//! widget consumes. No HTML/HTTP dependency, just the layout calculation.

const WINDOW: u32 = 3;
const MIN_PAGES_TO_COLLAPSE: u32 = 15;

pub struct Pagination {
    total_pages: u32,
    page: u32,
}

impl Pagination {
    pub fn new(total_pages: u32, page: u32) -> Result<Self, String> {
        if page > total_pages {
            return Err(format!("invalid page number: {}", page));
        }
        Ok(Pagination { total_pages, page })
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// `None` entries represent an ellipsis gap.
    pub fn layout(&self) -> Vec<Option<u32>> {
        let mut result: Vec<Option<u32>> = (1..=self.total_pages).map(Some).collect();

        if self.total_pages < MIN_PAGES_TO_COLLAPSE {
            return result;
        }

        let right_distance = self.total_pages - self.page;
        if right_distance > WINDOW * 2 {
            let start = (self.page + WINDOW) as usize;
            let end = (self.total_pages - WINDOW + 1) as usize;
            result.splice(start - 1..end - 1, [None]);
        }

        let left_distance = self.page - 1;
        if left_distance > WINDOW * 2 {
            let start = (1 + WINDOW) as usize;
            let end = (self.page - WINDOW + 1) as usize;
            result.splice(start - 1..end - 1, [None]);
        }

        result
    }

    pub fn prev_enabled(&self) -> bool {
        self.page > 1
    }

    pub fn next_enabled(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_page_count_is_not_collapsed() {
        let p = Pagination::new(5, 3).unwrap();
        assert_eq!(
            p.layout(),
            vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
        );
    }

    #[test]
    fn collapses_both_sides_around_the_current_page() {
        let p = Pagination::new(20, 10).unwrap();
        assert_eq!(
            p.layout(),
            vec![
                Some(1),
                Some(2),
                Some(3),
                None,
                Some(8),
                Some(9),
                Some(10),
                Some(11),
                Some(12),
                None,
                Some(18),
                Some(19),
                Some(20),
            ]
        );
    }

    #[test]
    fn rejects_page_past_the_end() {
        assert!(Pagination::new(5, 6).is_err());
    }

    #[test]
    fn prev_next_enabled_at_boundaries() {
        let first = Pagination::new(5, 1).unwrap();
        assert!(!first.prev_enabled());
        assert!(first.next_enabled());

        let last = Pagination::new(5, 5).unwrap();
        assert!(last.prev_enabled());
        assert!(!last.next_enabled());
    }
}
