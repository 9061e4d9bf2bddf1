//! Filtering, sorting and paging of poll cards for the browse pages.

use std::cmp::Reverse;

use myvote_shared::{Paginated, PollStatus, PollSummary};
use serde::Deserialize;

pub const DEFAULT_PER_PAGE: i64 = 12;
pub const MAX_PER_PAGE: i64 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Latest,
    Popular,
    Deadline,
}

/// GET /api/polls?category=food&status=active&q=pizza&sort=popular&page=2
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
    pub q: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Both timestamps are `YYYY-MM-DD HH:MM:SS`, so string order is time order.
pub fn status_at(deadline: &str, now: &str) -> PollStatus {
    if deadline <= now {
        PollStatus::Ended
    } else {
        PollStatus::Active
    }
}

/// Resolved `(page, per_page, offset)`.
pub fn page_bounds(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

fn matches(poll: &PollSummary, params: &ListParams, needle: Option<&str>) -> bool {
    if let Some(cat) = params.category.as_deref().filter(|c| !c.is_empty()) {
        if poll.category_slug != cat {
            return false;
        }
    }

    let status_ok = match params.status {
        StatusFilter::All => true,
        StatusFilter::Active => poll.status == PollStatus::Active,
        StatusFilter::Ended => poll.status == PollStatus::Ended,
    };
    if !status_ok {
        return false;
    }

    match needle {
        Some(needle) => {
            poll.title.to_lowercase().contains(needle)
                || poll.description.to_lowercase().contains(needle)
        }
        None => true,
    }
}

fn sort(polls: &mut [PollSummary], order: SortOrder) {
    match order {
        SortOrder::Latest => {
            polls.sort_by(|a, b| (&b.created_at, b.id).cmp(&(&a.created_at, a.id)));
        }
        SortOrder::Popular => {
            polls.sort_by_key(|p| (Reverse(p.vote_count), Reverse(p.created_at.clone()), Reverse(p.id)));
        }
        SortOrder::Deadline => {
            // Open polls closing soonest, then ended polls, most recently ended first.
            polls.sort_by(|a, b| match (a.status, b.status) {
                (PollStatus::Active, PollStatus::Ended) => std::cmp::Ordering::Less,
                (PollStatus::Ended, PollStatus::Active) => std::cmp::Ordering::Greater,
                (PollStatus::Active, PollStatus::Active) => {
                    (&a.deadline, a.id).cmp(&(&b.deadline, b.id))
                }
                (PollStatus::Ended, PollStatus::Ended) => {
                    (&b.deadline, b.id).cmp(&(&a.deadline, a.id))
                }
            });
        }
    }
}

pub fn apply(polls: Vec<PollSummary>, params: &ListParams) -> Paginated<PollSummary> {
    let needle = params
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    let mut selected: Vec<PollSummary> = polls
        .into_iter()
        .filter(|p| matches(p, params, needle.as_deref()))
        .collect();
    sort(&mut selected, params.sort);

    let (page, per_page, offset) = page_bounds(params.page, params.per_page);
    let total = selected.len() as i64;
    let items = selected
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(per_page as usize)
        .collect();

    Paginated {
        items,
        total,
        page,
        per_page,
    }
}
