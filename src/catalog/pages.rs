//! Offset/limit paging and button text helpers.

pub const ANIME_PER_PAGE: usize = 10;
pub const MAX_TITLE_LEN: usize = 30;
pub const EPISODES_PER_ROW: usize = 5;
pub const ROWS_PER_PAGE: usize = 10;
pub const EPISODES_PER_PAGE: usize = EPISODES_PER_ROW * ROWS_PER_PAGE;

/// One page of a sorted list.
#[derive(Debug)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// Page actually shown; out-of-range requests are clamped to the last page.
    pub number: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

pub fn page_count(len: usize, per_page: usize) -> usize {
    len.div_ceil(per_page).max(1)
}

pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> Page<'_, T> {
    let last = page_count(items.len(), per_page) - 1;
    let number = page.min(last);
    let start = number * per_page;
    let end = (start + per_page).min(items.len());

    Page {
        items: &items[start..end],
        number,
        has_prev: number > 0,
        has_next: number < last,
    }
}

/// Page that shows the item at `index`.
pub fn page_of(index: usize, per_page: usize) -> usize {
    index / per_page
}

/// Capitalizes the first letter of every alphabetic run, lowercases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Shortens a title to `max` characters, ending in "..." when cut.
pub fn cut_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let kept: String = title.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Button text for an anime in the list.
pub fn anime_button_title(name: &str) -> String {
    cut_title(&title_case(name), MAX_TITLE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_middle_page() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(&items, 1, 10);
        assert_eq!(page.items, &items[10..20]);
        assert!(page.has_prev);
        assert!(page.has_next);
    }

    #[test]
    fn test_paginate_last_partial_page() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(&items, 2, 10);
        assert_eq!(page.items.len(), 5);
        assert!(page.has_prev);
        assert!(!page.has_next);
    }

    #[test]
    fn test_paginate_clamps_out_of_range() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(&items, 99, 10);
        assert_eq!(page.number, 2);
        assert_eq!(page.items.len(), 5);
    }

    #[test]
    fn test_paginate_empty() {
        let items: Vec<u32> = Vec::new();
        let page = paginate(&items, 0, 10);
        assert!(page.items.is_empty());
        assert!(!page.has_prev);
        assert!(!page.has_next);
    }

    #[test]
    fn test_exact_multiple_has_no_extra_page() {
        assert_eq!(page_count(50, EPISODES_PER_PAGE), 1);
        assert_eq!(page_count(51, EPISODES_PER_PAGE), 2);
        assert_eq!(page_count(0, EPISODES_PER_PAGE), 1);
    }

    #[test]
    fn test_page_of() {
        assert_eq!(page_of(0, EPISODES_PER_PAGE), 0);
        assert_eq!(page_of(49, EPISODES_PER_PAGE), 0);
        assert_eq!(page_of(50, EPISODES_PER_PAGE), 1);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("one piece"), "One Piece");
        assert_eq!(title_case("re:zero"), "Re:Zero");
        assert_eq!(title_case("атака титанов"), "Атака Титанов");
    }

    #[test]
    fn test_cut_title_counts_chars_not_bytes() {
        let long = "я".repeat(40);
        let cut = cut_title(&long, MAX_TITLE_LEN);
        assert_eq!(cut.chars().count(), MAX_TITLE_LEN);
        assert!(cut.ends_with("..."));
        assert_eq!(cut_title("short", MAX_TITLE_LEN), "short");
    }
}
