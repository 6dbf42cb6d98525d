use crate::api::ApiClient;
use crate::error::{ApiError, ViewError};
use crate::item::ItemView;
use crate::models::{PageRequest, PageResponse, Todo};
use chrono::NaiveDateTime;

const LOGIN_FOR_MINE: &str = "Log in to see only your todos.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn flipped(self) -> SortOrder {
        match self {
            SortOrder::NewestFirst => SortOrder::OldestFirst,
            SortOrder::OldestFirst => SortOrder::NewestFirst,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "Newest",
            SortOrder::OldestFirst => "Oldest",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageButton {
    Page(u32),
    Ellipsis,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteTarget {
    pub id: i64,
    pub title: String,
}

// Metadata of the page currently shown
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageInfo {
    pub number: u32,
    pub total_pages: u32,
    pub total_elements: u64,
}

pub fn matches_search(todo: &Todo, query: &str) -> bool {
    let query = query.to_lowercase();
    todo.title.to_lowercase().contains(&query)
        || todo
            .owner()
            .is_some_and(|owner| owner.to_lowercase().contains(&query))
}

/// Stable: entries with equal timestamps keep their relative order.
pub fn sort_todos<T, F>(items: &mut [T], order: SortOrder, created_at: F)
where
    F: Fn(&T) -> NaiveDateTime,
{
    match order {
        SortOrder::NewestFirst => items.sort_by(|a, b| created_at(b).cmp(&created_at(a))),
        SortOrder::OldestFirst => items.sort_by(|a, b| created_at(a).cmp(&created_at(b))),
    }
}

/// First page, last page, and two pages either side of `current`, with
/// `Ellipsis` wherever numbers are skipped.
pub fn page_buttons(current: u32, total: u32) -> Vec<PageButton> {
    let mut buttons = Vec::new();
    let mut previous: Option<u32> = None;

    for n in 0..total {
        let shown = n == 0 || n + 1 == total || n.abs_diff(current) <= 2;
        if !shown {
            continue;
        }
        if let Some(prev) = previous {
            if n - prev > 1 {
                buttons.push(PageButton::Ellipsis);
            }
        }
        buttons.push(PageButton::Page(n));
        previous = Some(n);
    }
    buttons
}

/// The top-level todo list.
///
/// Every mutation is followed by a full re-fetch of the current page; rows
/// are rebuilt from the response, keeping the expanded state and loaded
/// sub-items of rows that are still present.
pub struct ListView {
    pub rows: Vec<ItemView>,
    pub page: PageInfo,
    pub search: String,
    pub sort: SortOrder,
    pub show_mine: bool,
    pub notice: Option<String>,
    pub delete_target: Option<DeleteTarget>,
    paged: bool,
    page_size: u32,
}

impl ListView {
    pub fn new(paged: bool, page_size: u32) -> ListView {
        ListView {
            rows: Vec::new(),
            page: PageInfo::default(),
            search: String::new(),
            sort: SortOrder::NewestFirst,
            show_mine: false,
            notice: None,
            delete_target: None,
            paged,
            page_size: page_size.max(1),
        }
    }

    pub fn is_paged(&self) -> bool {
        self.paged
    }

    fn page_request(&self) -> Option<PageRequest> {
        self.paged.then_some(PageRequest {
            page: self.page.number,
            size: self.page_size,
        })
    }

    async fn fetch_page(&self, api: &ApiClient) -> Result<PageResponse<Todo>, ApiError> {
        let request = self.page_request();
        let collection = if self.show_mine {
            api.list_my_todos(request).await?
        } else {
            api.list_todos(request).await?
        };
        Ok(collection.into_page(request))
    }

    /// Fetch the current page. A page index past the end (after a delete
    /// emptied the last page) falls back to the new last page.
    pub async fn load(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        let mut page = self.fetch_page(api).await?;
        if page.total_pages > 0 && page.number >= page.total_pages {
            self.page.number = page.total_pages - 1;
            page = self.fetch_page(api).await?;
        }

        tracing::debug!(
            "Loaded page {} of {} ({} todos)",
            page.number,
            page.total_pages,
            page.number_of_elements
        );

        self.page = PageInfo {
            number: page.number,
            total_pages: page.total_pages,
            total_elements: page.total_elements,
        };
        self.replace_rows(page.content);
        Ok(())
    }

    fn replace_rows(&mut self, todos: Vec<Todo>) {
        let mut previous = std::mem::take(&mut self.rows);
        self.rows = todos
            .into_iter()
            .map(|todo| match previous.iter().position(|row| row.id() == todo.id) {
                Some(index) => {
                    let mut row = previous.swap_remove(index);
                    row.todo = todo;
                    row.edit = None;
                    row
                }
                None => ItemView::new(todo),
            })
            .collect();
    }

    /// Indices into `rows` after the mine-filter, search and sort.
    pub fn visible(&self, session: Option<&str>) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                !(self.show_mine && session.is_some() && row.todo.owner() != session)
            })
            .filter(|(_, row)| matches_search(&row.todo, &self.search))
            .map(|(index, _)| index)
            .collect();
        sort_todos(&mut indices, self.sort, |&index| self.rows[index].todo.created_at);
        indices
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.to_string();
    }

    pub fn flip_sort(&mut self) {
        self.sort = self.sort.flipped();
    }

    /// Force the mine-filter off when there is no session.
    pub fn sync_session(&mut self, session: Option<&str>) {
        if session.is_none() && self.show_mine {
            self.show_mine = false;
            self.notice = Some(LOGIN_FOR_MINE.to_string());
        }
    }

    pub async fn toggle_show_mine(
        &mut self,
        api: &ApiClient,
        session: Option<&str>,
    ) -> Result<(), ApiError> {
        if session.is_none() {
            self.show_mine = false;
            self.notice = Some(LOGIN_FOR_MINE.to_string());
            return Ok(());
        }
        self.show_mine = !self.show_mine;
        self.page.number = 0;
        self.load(api).await
    }

    pub async fn add(
        &mut self,
        api: &ApiClient,
        session: Option<&str>,
        title: &str,
    ) -> Result<(), ViewError> {
        if session.is_none() {
            return Err(ViewError::Validation("Log in to add todos.".into()));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(ViewError::Validation("Enter a todo title.".into()));
        }
        let created = api.create_todo(title).await?;
        tracing::info!("Created todo {}", created.id);
        self.load(api).await?;
        Ok(())
    }

    pub fn request_delete(&mut self, id: i64) {
        self.delete_target = self
            .rows
            .iter()
            .find(|row| row.id() == id)
            .map(|row| DeleteTarget {
                id,
                title: row.todo.title.clone(),
            });
    }

    pub fn cancel_delete(&mut self) {
        self.delete_target = None;
    }

    pub async fn confirm_delete(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        let Some(target) = self.delete_target.take() else {
            return Ok(());
        };
        api.delete_todo(target.id).await?;
        tracing::info!("Deleted todo {}", target.id);
        self.load(api).await
    }

    /// Returns `false` without fetching when `page` is out of range.
    pub async fn go_to_page(&mut self, api: &ApiClient, page: u32) -> Result<bool, ApiError> {
        if !self.paged || page >= self.page.total_pages || page == self.page.number {
            return Ok(false);
        }
        self.page.number = page;
        self.load(api).await?;
        Ok(true)
    }

    pub async fn next_page(&mut self, api: &ApiClient) -> Result<bool, ApiError> {
        let next = self.page.number.saturating_add(1);
        self.go_to_page(api, next).await
    }

    pub async fn previous_page(&mut self, api: &ApiClient) -> Result<bool, ApiError> {
        match self.page.number.checked_sub(1) {
            Some(previous) => self.go_to_page(api, previous).await,
            None => Ok(false),
        }
    }

    pub fn page_buttons(&self) -> Vec<PageButton> {
        page_buttons(self.page.number, self.page.total_pages)
    }
}
