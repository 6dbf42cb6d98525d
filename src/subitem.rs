use crate::api::ApiClient;
use crate::edit::TitleEdit;
use crate::error::ApiError;
use crate::models::SubTodo;

/// One sub-todo row. Mutations go straight to the server; the owning
/// `ItemView` re-fetches afterwards.
#[derive(Debug, Clone)]
pub struct SubItem {
    pub sub: SubTodo,
    pub edit: Option<TitleEdit>,
}

impl SubItem {
    pub fn new(sub: SubTodo) -> SubItem {
        SubItem { sub, edit: None }
    }

    pub fn id(&self) -> i64 {
        self.sub.id
    }

    pub async fn toggle(&self, api: &ApiClient) -> Result<SubTodo, ApiError> {
        api.toggle_subtodo(self.sub.id).await
    }

    pub async fn delete(&self, api: &ApiClient) -> Result<(), ApiError> {
        api.delete_subtodo(self.sub.id).await
    }

    pub fn begin_edit(&mut self) {
        self.edit = Some(TitleEdit::new(&self.sub.title));
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    /// Close the editor; send the title if it changed. Returns whether a request went out.
    pub async fn commit_edit(&mut self, api: &ApiClient) -> Result<bool, ApiError> {
        let Some(title) = self.edit.take().and_then(|edit| edit.committed_title()) else {
            return Ok(false);
        };
        self.sub = SubTodo {
            todo_id: self.sub.todo_id,
            ..api.update_subtodo(self.sub.id, &title).await?
        };
        Ok(true)
    }
}
