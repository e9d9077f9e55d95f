//! Per-user conversation state that does not need to survive a restart.

use std::collections::HashMap;

use teloxide::types::{ChatId, MessageId, UserId};
use tokio::sync::Mutex;

use crate::payments::Plan;

#[derive(Debug, Default, Clone)]
struct Session {
    selected_plan: Option<Plan>,
    awaiting_receipt: bool,
    /// Anime key whose English title the admin is editing.
    editing_title: Option<String>,
    /// Bot messages on screen, removed when the next screen is shown.
    tracked: Vec<(ChatId, MessageId)>,
}

#[derive(Default)]
pub struct Sessions {
    inner: Mutex<HashMap<UserId, Session>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn select_plan(&self, user: UserId, plan: Plan) {
        let mut sessions = self.inner.lock().await;
        let session = sessions.entry(user).or_default();
        session.selected_plan = Some(plan);
        session.awaiting_receipt = false;
    }

    pub async fn selected_plan(&self, user: UserId) -> Option<Plan> {
        self.inner.lock().await.get(&user).and_then(|s| s.selected_plan)
    }

    /// Starts waiting for a transfer receipt. Returns the plan being paid
    /// for, or `None` (and no state change) if no plan was picked.
    pub async fn await_receipt(&self, user: UserId) -> Option<Plan> {
        let mut sessions = self.inner.lock().await;
        let session = sessions.get_mut(&user)?;
        let plan = session.selected_plan?;
        session.awaiting_receipt = true;
        Some(plan)
    }

    /// Consumes the awaiting-receipt state.
    pub async fn take_receipt(&self, user: UserId) -> Option<Plan> {
        let mut sessions = self.inner.lock().await;
        let session = sessions.get_mut(&user)?;
        if !session.awaiting_receipt {
            return None;
        }
        session.awaiting_receipt = false;
        session.selected_plan.take()
    }

    pub async fn start_title_edit(&self, user: UserId, anime_key: String) {
        self.inner.lock().await.entry(user).or_default().editing_title = Some(anime_key);
    }

    pub async fn editing_title(&self, user: UserId) -> Option<String> {
        self.inner.lock().await.get(&user).and_then(|s| s.editing_title.clone())
    }

    pub async fn finish_title_edit(&self, user: UserId) {
        if let Some(session) = self.inner.lock().await.get_mut(&user) {
            session.editing_title = None;
        }
    }

    pub async fn track(&self, user: UserId, chat: ChatId, message: MessageId) {
        let mut sessions = self.inner.lock().await;
        let tracked = &mut sessions.entry(user).or_default().tracked;
        if !tracked.contains(&(chat, message)) {
            tracked.push((chat, message));
        }
    }

    pub async fn take_tracked(&self, user: UserId) -> Vec<(ChatId, MessageId)> {
        self.inner
            .lock()
            .await
            .get_mut(&user)
            .map(|s| std::mem::take(&mut s.tracked))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(42);

    #[tokio::test]
    async fn test_receipt_requires_selected_plan() {
        let sessions = Sessions::new();
        assert_eq!(sessions.await_receipt(USER).await, None);
        assert_eq!(sessions.take_receipt(USER).await, None);

        sessions.select_plan(USER, Plan::Month).await;
        assert_eq!(sessions.take_receipt(USER).await, None);
        assert_eq!(sessions.await_receipt(USER).await, Some(Plan::Month));
        assert_eq!(sessions.take_receipt(USER).await, Some(Plan::Month));
        assert_eq!(sessions.take_receipt(USER).await, None);
        assert_eq!(sessions.selected_plan(USER).await, None);
    }

    #[tokio::test]
    async fn test_reselecting_plan_cancels_receipt_wait() {
        let sessions = Sessions::new();
        sessions.select_plan(USER, Plan::Week).await;
        sessions.await_receipt(USER).await;
        sessions.select_plan(USER, Plan::Year).await;
        assert_eq!(sessions.take_receipt(USER).await, None);
        assert_eq!(sessions.selected_plan(USER).await, Some(Plan::Year));
    }

    #[tokio::test]
    async fn test_title_edit() {
        let sessions = Sessions::new();
        sessions.start_title_edit(USER, "abc123abc123".into()).await;
        assert_eq!(sessions.editing_title(USER).await.as_deref(), Some("abc123abc123"));
        sessions.finish_title_edit(USER).await;
        assert_eq!(sessions.editing_title(USER).await, None);
    }

    #[tokio::test]
    async fn test_tracked_messages_are_drained() {
        let sessions = Sessions::new();
        sessions.track(USER, ChatId(42), MessageId(1)).await;
        sessions.track(USER, ChatId(42), MessageId(2)).await;
        sessions.track(USER, ChatId(42), MessageId(1)).await;
        assert_eq!(sessions.take_tracked(USER).await, vec![(ChatId(42), MessageId(1)), (ChatId(42), MessageId(2))]);
        assert!(sessions.take_tracked(USER).await.is_empty());
        assert!(sessions.take_tracked(UserId(7)).await.is_empty());
    }
}
