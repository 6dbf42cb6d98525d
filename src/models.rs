use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// Owner embedded in a todo
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct Owner {
    pub username: String,
}

// Todo struct
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub checked: bool,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub user: Option<Owner>,
}

impl Todo {
    pub fn owner(&self) -> Option<&str> {
        self.user.as_ref().map(|owner| owner.username.as_str())
    }
}

// SubTodo struct; the server does not send the parent id, the item view fills it in
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubTodo {
    pub id: i64,
    pub title: String,
    pub checked: bool,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing)]
    pub todo_id: Option<i64>,
}

// Session user
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Zero-based page index plus page size, sent as `page` and `size` query params.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

/// One slice of a larger collection.
///
/// `content.len() == number_of_elements <= size` holds for every page built here.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
    pub size: u32,
    pub number: u32,
    pub first: bool,
    pub last: bool,
    pub number_of_elements: u32,
}

impl<T> PageResponse<T> {
    /// Cut page `page` of `size` items out of the full collection.
    pub fn from_items(items: Vec<T>, page: u32, size: u32) -> Self {
        let size = size.max(1);
        let total_elements = items.len() as u64;
        let total_pages = total_elements.div_ceil(u64::from(size)) as u32;
        let start = (page as usize).saturating_mul(size as usize);

        let content: Vec<T> = items.into_iter().skip(start).take(size as usize).collect();

        PageResponse {
            number_of_elements: content.len() as u32,
            content,
            total_elements,
            total_pages,
            size,
            number: page,
            first: page == 0,
            last: page.saturating_add(1) >= total_pages,
        }
    }

    /// Wrap an unpaged collection as its own single page.
    pub fn single(items: Vec<T>) -> Self {
        let count = items.len() as u32;
        PageResponse {
            content: items,
            total_elements: u64::from(count),
            total_pages: u32::from(count > 0),
            size: count,
            number: 0,
            first: true,
            last: true,
            number_of_elements: count,
        }
    }
}

/// The todo listing endpoints answer with either a bare array or a page.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum TodoCollection {
    Page(PageResponse<Todo>),
    List(Vec<Todo>),
}

impl TodoCollection {
    pub fn into_page(self, request: Option<PageRequest>) -> PageResponse<Todo> {
        match (self, request) {
            (TodoCollection::Page(page), _) => page,
            (TodoCollection::List(items), Some(req)) => {
                PageResponse::from_items(items, req.page, req.size)
            }
            (TodoCollection::List(items), None) => PageResponse::single(items),
        }
    }
}
