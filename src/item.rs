use crate::api::ApiClient;
use crate::edit::TitleEdit;
use crate::error::{ApiError, ViewError};
use crate::models::Todo;
use crate::subitem::SubItem;

const SUBITEM_GONE: &str = "That sub-item no longer exists.";

/// One todo row. Owns its sub-items and fetches them itself; nothing is
/// shared with other rows.
#[derive(Debug, Clone)]
pub struct ItemView {
    pub todo: Todo,
    pub subitems: Vec<SubItem>,
    pub expanded: bool,
    pub edit: Option<TitleEdit>,
}

impl ItemView {
    pub fn new(todo: Todo) -> ItemView {
        ItemView {
            todo,
            subitems: Vec::new(),
            expanded: false,
            edit: None,
        }
    }

    pub fn id(&self) -> i64 {
        self.todo.id
    }

    /// Whether toggle/edit/delete controls should be offered. The server
    /// still makes the real decision.
    pub fn is_owned_by(&self, session: Option<&str>) -> bool {
        matches!((session, self.todo.owner()), (Some(user), Some(owner)) if user == owner)
    }

    fn ensure_owner(&self, session: Option<&str>) -> Result<(), ViewError> {
        if self.is_owned_by(session) {
            Ok(())
        } else {
            Err(ViewError::NotOwner)
        }
    }

    pub fn subitem_mut(&mut self, sub_id: i64) -> Option<&mut SubItem> {
        self.subitems.iter_mut().find(|item| item.id() == sub_id)
    }

    pub async fn load_subitems(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        let todo_id = self.todo.id;
        let subs = api.list_subtodos(todo_id).await?;
        self.subitems = subs
            .into_iter()
            .map(|mut sub| {
                sub.todo_id = Some(todo_id);
                SubItem::new(sub)
            })
            .collect();
        Ok(())
    }

    pub async fn toggle_expanded(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        self.expanded = !self.expanded;
        if self.expanded {
            self.load_subitems(api).await?;
        }
        Ok(())
    }

    pub async fn add_subitem(
        &mut self,
        api: &ApiClient,
        session: Option<&str>,
        title: &str,
    ) -> Result<(), ViewError> {
        self.ensure_owner(session)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ViewError::Validation("Enter a sub-item title.".into()));
        }
        api.create_subtodo(self.todo.id, title).await?;
        self.expanded = true;
        self.load_subitems(api).await?;
        Ok(())
    }

    pub async fn toggle_subitem(
        &mut self,
        api: &ApiClient,
        session: Option<&str>,
        sub_id: i64,
    ) -> Result<(), ViewError> {
        self.ensure_owner(session)?;
        let Some(item) = self.subitems.iter().find(|item| item.id() == sub_id) else {
            self.load_subitems(api).await?;
            return Err(ViewError::Validation(SUBITEM_GONE.into()));
        };
        item.toggle(api).await?;
        self.load_subitems(api).await?;
        Ok(())
    }

    pub async fn delete_subitem(
        &mut self,
        api: &ApiClient,
        session: Option<&str>,
        sub_id: i64,
    ) -> Result<(), ViewError> {
        self.ensure_owner(session)?;
        let Some(item) = self.subitems.iter().find(|item| item.id() == sub_id) else {
            self.load_subitems(api).await?;
            return Err(ViewError::Validation(SUBITEM_GONE.into()));
        };
        item.delete(api).await?;
        self.load_subitems(api).await?;
        Ok(())
    }

    pub fn begin_subitem_edit(
        &mut self,
        session: Option<&str>,
        sub_id: i64,
    ) -> Result<(), ViewError> {
        self.ensure_owner(session)?;
        if let Some(item) = self.subitem_mut(sub_id) {
            item.begin_edit();
        }
        Ok(())
    }

    pub async fn commit_subitem_edit(
        &mut self,
        api: &ApiClient,
        sub_id: i64,
    ) -> Result<bool, ViewError> {
        let Some(item) = self.subitem_mut(sub_id) else {
            return Ok(false);
        };
        let sent = item.commit_edit(api).await?;
        if sent {
            self.load_subitems(api).await?;
        }
        Ok(sent)
    }

    pub fn begin_edit(&mut self, session: Option<&str>) -> Result<(), ViewError> {
        self.ensure_owner(session)?;
        self.edit = Some(TitleEdit::new(&self.todo.title));
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    /// Close the editor; send the title if it changed. Returns whether a request went out.
    pub async fn commit_edit(&mut self, api: &ApiClient) -> Result<bool, ViewError> {
        let Some(title) = self.edit.take().and_then(|edit| edit.committed_title()) else {
            return Ok(false);
        };
        self.todo = api.update_todo(self.todo.id, &title).await?;
        Ok(true)
    }

    /// Toggle the todo and bring every sub-item to the same state.
    ///
    /// Sub-items are toggled one request at a time. If one fails, the ones
    /// already flipped and the todo itself are toggled back before the error
    /// is returned. Sub-items are re-fetched either way.
    pub async fn toggle(
        &mut self,
        api: &ApiClient,
        session: Option<&str>,
    ) -> Result<(), ViewError> {
        self.ensure_owner(session)?;
        self.load_subitems(api).await?;

        self.todo = api.toggle_todo(self.todo.id).await?;
        let target = self.todo.checked;

        let pending: Vec<i64> = self
            .subitems
            .iter()
            .filter(|item| item.sub.checked != target)
            .map(SubItem::id)
            .collect();

        let mut flipped = Vec::with_capacity(pending.len());
        for &sub_id in &pending {
            match api.toggle_subtodo(sub_id).await {
                Ok(_) => flipped.push(sub_id),
                Err(err) => {
                    tracing::warn!(
                        "Cascade on todo {} stopped at sub-item {} ({} of {} done): {}",
                        self.todo.id,
                        sub_id,
                        flipped.len(),
                        pending.len(),
                        err
                    );
                    self.roll_back(api, &flipped).await;
                    if let Err(err) = self.load_subitems(api).await {
                        tracing::warn!("Failed to reload sub-items of {}: {}", self.todo.id, err);
                    }
                    return Err(ViewError::Cascade {
                        completed: flipped.len(),
                        total: pending.len(),
                        source: err,
                    });
                }
            }
        }

        self.load_subitems(api).await?;
        Ok(())
    }

    async fn roll_back(&mut self, api: &ApiClient, flipped: &[i64]) {
        for &sub_id in flipped.iter().rev() {
            if let Err(err) = api.toggle_subtodo(sub_id).await {
                tracing::error!("Could not restore sub-item {}: {}", sub_id, err);
            }
        }
        match api.toggle_todo(self.todo.id).await {
            Ok(todo) => self.todo = todo,
            Err(err) => tracing::error!("Could not restore todo {}: {}", self.todo.id, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use pretty_assertions::assert_eq;

    async fn logged_in(backend: &MockBackend, username: &str) -> ApiClient {
        let api = backend.client();
        backend.add_user(username, "secret!a");
        api.login(username, "secret!a").await.unwrap();
        api
    }

    fn checked_states(backend: &MockBackend, todo_id: i64) -> Vec<bool> {
        backend
            .subtodos(todo_id)
            .iter()
            .map(|sub| sub.checked)
            .collect()
    }

    #[tokio::test]
    async fn test_cascade_checks_every_subitem() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Move house");
        backend.add_subtodo(todo.id, "Pack");
        backend.add_subtodo(todo.id, "Label boxes");

        let mut item = ItemView::new(todo.clone());
        item.toggle(&api, Some("alice")).await.unwrap();

        assert!(item.todo.checked);
        assert!(backend.todo(todo.id).unwrap().checked);
        assert_eq!(checked_states(&backend, todo.id), vec![true, true]);
        assert!(item.subitems.iter().all(|sub| sub.sub.checked));

        item.toggle(&api, Some("alice")).await.unwrap();
        assert!(!backend.todo(todo.id).unwrap().checked);
        assert_eq!(checked_states(&backend, todo.id), vec![false, false]);
    }

    #[tokio::test]
    async fn test_cascade_leaves_matching_subitems_alone() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Garden");
        let done = backend.add_subtodo(todo.id, "Water");
        backend.add_subtodo(todo.id, "Weed");
        api.toggle_subtodo(done.id).await.unwrap();

        let mut item = ItemView::new(todo.clone());
        item.toggle(&api, Some("alice")).await.unwrap();

        assert_eq!(checked_states(&backend, todo.id), vec![true, true]);
    }

    #[tokio::test]
    async fn test_failed_cascade_is_rolled_back() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Taxes");
        backend.add_subtodo(todo.id, "Receipts");
        let broken = backend.add_subtodo(todo.id, "Forms");
        backend.add_subtodo(todo.id, "File");
        backend.fail_subtodo_toggle(broken.id);

        let mut item = ItemView::new(todo.clone());
        let err = item.toggle(&api, Some("alice")).await.unwrap_err();

        assert!(matches!(
            err,
            ViewError::Cascade {
                completed: 1,
                total: 3,
                ..
            }
        ));
        assert!(!backend.todo(todo.id).unwrap().checked);
        assert!(!item.todo.checked);
        assert_eq!(checked_states(&backend, todo.id), vec![false, false, false]);
        assert_eq!(item.subitems.len(), 3);
    }

    #[tokio::test]
    async fn test_non_owner_is_refused_before_any_request() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "bob").await;
        let todo = backend.add_todo("alice", "Alice's todo");
        backend.add_subtodo(todo.id, "Step");

        let mut item = ItemView::new(todo.clone());
        assert!(!item.is_owned_by(Some("bob")));
        assert!(!item.is_owned_by(None));

        let err = item.toggle(&api, Some("bob")).await.unwrap_err();
        assert!(matches!(err, ViewError::NotOwner));
        assert!(item.begin_edit(Some("bob")).is_err());
        assert!(!backend.todo(todo.id).unwrap().checked);
        assert!(item.subitems.is_empty());
    }

    #[tokio::test]
    async fn test_subitem_mutations_refetch() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Groceries");

        let mut item = ItemView::new(todo.clone());
        let err = item.add_subitem(&api, Some("alice"), "   ").await.unwrap_err();
        assert!(matches!(err, ViewError::Validation(_)));

        item.add_subitem(&api, Some("alice"), " Eggs ").await.unwrap();
        item.add_subitem(&api, Some("alice"), "Bread").await.unwrap();
        assert!(item.expanded);
        assert_eq!(item.subitems.len(), 2);
        assert_eq!(item.subitems[0].sub.title, "Eggs");
        assert_eq!(item.subitems[0].sub.todo_id, Some(todo.id));

        let eggs = item.subitems[0].id();
        item.toggle_subitem(&api, Some("alice"), eggs).await.unwrap();
        assert!(item.subitems[0].sub.checked);

        item.delete_subitem(&api, Some("alice"), eggs).await.unwrap();
        assert_eq!(item.subitems.len(), 1);
        assert_eq!(backend.subtodos(todo.id).len(), 1);
    }

    #[tokio::test]
    async fn test_title_edit() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Call mom");

        let mut item = ItemView::new(todo.clone());
        item.begin_edit(Some("alice")).unwrap();
        assert!(!item.commit_edit(&api).await.unwrap());

        item.begin_edit(Some("alice")).unwrap();
        item.edit.as_mut().unwrap().buffer = "Call mom tonight".into();
        assert!(item.commit_edit(&api).await.unwrap());
        assert_eq!(item.todo.title, "Call mom tonight");
        assert_eq!(backend.todo(todo.id).unwrap().title, "Call mom tonight");
    }

    #[tokio::test]
    async fn test_unknown_subitem_is_reported() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Trip");

        let mut item = ItemView::new(todo.clone());
        item.toggle_expanded(&api).await.unwrap();
        let late = backend.add_subtodo(todo.id, "Passport");

        let err = item.toggle_subitem(&api, Some("alice"), 999).await.unwrap_err();
        assert!(matches!(err, ViewError::Validation(_)));
        let err = item.delete_subitem(&api, Some("alice"), 999).await.unwrap_err();
        assert_eq!(err.user_message(), SUBITEM_GONE);

        // The failed lookup still refreshes, so the new row shows up.
        assert_eq!(item.subitems.len(), 1);
        assert_eq!(item.subitems[0].id(), late.id);
        assert!(!backend.subtodos(todo.id)[0].checked);
    }

    #[tokio::test]
    async fn test_subitem_title_edit_refetches() {
        let backend = MockBackend::start().await;
        let api = logged_in(&backend, "alice").await;
        let todo = backend.add_todo("alice", "Trip");
        let pack = backend.add_subtodo(todo.id, "Pack");

        let mut item = ItemView::new(todo);
        item.toggle_expanded(&api).await.unwrap();
        item.begin_subitem_edit(Some("alice"), pack.id).unwrap();
        item.subitem_mut(pack.id).unwrap().edit.as_mut().unwrap().buffer = "Pack light".into();

        assert!(item.commit_subitem_edit(&api, pack.id).await.unwrap());
        assert_eq!(item.subitems[0].sub.title, "Pack light");
    }
}
